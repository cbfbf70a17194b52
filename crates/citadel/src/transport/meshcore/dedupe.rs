// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Duplicate suppression. The mesh freely retransmits; without this,
//! repeats would re-drive workflows.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_TTL: Duration = Duration::from_secs(10);

/// Prune cadence for the background sweeper.
const PRUNE_INTERVAL: Duration = Duration::from_secs(5);

pub struct MessageDeduplicator {
    seen: Mutex<HashMap<[u8; 32], Instant>>,
    ttl: Duration,
}

impl MessageDeduplicator {
    pub fn new(ttl: Duration) -> Arc<Self> {
        Arc::new(Self { seen: Mutex::new(HashMap::new()), ttl })
    }

    /// True if the same `(node_id, text)` tuple was seen within the TTL.
    /// A fresh tuple is recorded and reported as not-duplicate.
    pub fn is_duplicate(&self, node_id: &str, text: &str) -> bool {
        let mut hasher = Sha256::new();
        hasher.update(node_id.as_bytes());
        hasher.update(b"::");
        hasher.update(text.as_bytes());
        let key: [u8; 32] = hasher.finalize().into();

        let Ok(mut seen) = self.seen.lock() else { return false };
        let now = Instant::now();
        if let Some(stamp) = seen.get(&key) {
            if now.duration_since(*stamp) < self.ttl {
                return true;
            }
        }
        seen.insert(key, now);
        false
    }

    /// Drop expired entries so the table stays small.
    pub fn clear_expired(&self) {
        let Ok(mut seen) = self.seen.lock() else { return };
        let now = Instant::now();
        seen.retain(|_, stamp| now.duration_since(*stamp) <= self.ttl);
    }

    pub fn len(&self) -> usize {
        self.seen.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawn the pruning sweeper; stops when `cancel` fires.
    pub fn spawn_sweeper(this: &Arc<Self>, cancel: CancellationToken) {
        let dedupe = Arc::clone(this);
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(PRUNE_INTERVAL);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = timer.tick() => {}
                }
                dedupe.clear_expired();
            }
        });
    }
}

#[cfg(test)]
#[path = "dedupe_tests.rs"]
mod tests;
