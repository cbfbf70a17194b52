// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session table: opaque tokens, node binding, workflow pointers, outboxes,
//! and the idle sweeper.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use serde_json::Map;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::transport::packets::ToUser;
use crate::workflows::WorkflowKind;

/// Random bytes per session token; 24 bytes = 192 bits.
const TOKEN_LEN: usize = 24;

/// Sweep period for idle-session expiry.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Text delivered to a node when its session is expired by the sweeper.
pub const SIGNAL_LOST_NOTICE: &str =
    "Signal lost. Disconnecting your session. Send any text to reconnect.";

pub type WorkflowData = Map<String, serde_json::Value>;

/// A multi-step dialogue attached to a session.
#[derive(Debug, Clone)]
pub struct WorkflowState {
    pub kind: WorkflowKind,
    pub step: u32,
    pub data: WorkflowData,
}

impl WorkflowState {
    pub fn new(kind: WorkflowKind) -> Self {
        Self { kind, step: 1, data: WorkflowData::new() }
    }

    pub fn at_step(kind: WorkflowKind, step: u32, data: WorkflowData) -> Self {
        Self { kind, step, data }
    }
}

/// Point-in-time copy of a session's state, safe to use outside the lock.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub username: Option<String>,
    pub node_id: Option<String>,
    pub current_room: Option<i64>,
    pub workflow: Option<WorkflowState>,
    pub logged_in: bool,
    pub last_active: Instant,
}

struct SessionEntry {
    username: Option<String>,
    node_id: Option<String>,
    current_room: Option<i64>,
    workflow: Option<WorkflowState>,
    logged_in: bool,
    last_active: Instant,
    outbox_tx: tokio::sync::mpsc::UnboundedSender<ToUser>,
    outbox_rx: Option<tokio::sync::mpsc::UnboundedReceiver<ToUser>>,
}

impl SessionEntry {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            username: self.username.clone(),
            node_id: self.node_id.clone(),
            current_room: self.current_room,
            workflow: self.workflow.clone(),
            logged_in: self.logged_in,
            last_active: self.last_active,
        }
    }
}

/// Called by the sweeper for each expired session, outside the table lock.
/// Receives the session id, its final snapshot, and the notice text.
pub type ExpiryCallback = Arc<dyn Fn(String, SessionSnapshot, &'static str) + Send + Sync>;

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, SessionEntry>,
    by_node: HashMap<String, String>,
}

pub struct SessionManager {
    timeout: Duration,
    inner: Mutex<Inner>,
    on_expiry: Mutex<Option<ExpiryCallback>>,
}

impl SessionManager {
    pub fn new(config: &Config) -> Arc<Self> {
        Arc::new(Self {
            timeout: config.auth.session_timeout(),
            inner: Mutex::new(Inner::default()),
            on_expiry: Mutex::new(None),
        })
    }

    /// Register the callback invoked when the sweeper expires a session.
    pub fn set_notification_callback(&self, callback: ExpiryCallback) {
        if let Ok(mut slot) = self.on_expiry.lock() {
            *slot = Some(callback);
        }
    }

    /// Create a session, optionally bound to a mesh node. A node gets at
    /// most one session; an existing binding is replaced.
    pub fn create_session(&self, node_id: Option<&str>) -> String {
        let token = new_token();
        let (outbox_tx, outbox_rx) = tokio::sync::mpsc::unbounded_channel();
        let entry = SessionEntry {
            username: None,
            node_id: node_id.map(str::to_owned),
            current_room: None,
            workflow: None,
            logged_in: false,
            last_active: Instant::now(),
            outbox_tx,
            outbox_rx: Some(outbox_rx),
        };
        let Ok(mut inner) = self.inner.lock() else { return token };
        if let Some(node_id) = node_id {
            if let Some(old) = inner.by_node.insert(node_id.to_owned(), token.clone()) {
                inner.sessions.remove(&old);
                tracing::warn!(node_id = %node_id, "replaced existing session for node");
            }
        }
        inner.sessions.insert(token.clone(), entry);
        tracing::info!(session_id = %token, node_id = ?node_id, "session created");
        token
    }

    pub fn get_session_by_node_id(&self, node_id: &str) -> Option<String> {
        let inner = self.inner.lock().ok()?;
        inner.by_node.get(node_id).cloned()
    }

    pub fn get_session_state(&self, session_id: &str) -> Option<SessionSnapshot> {
        let inner = self.inner.lock().ok()?;
        inner.sessions.get(session_id).map(SessionEntry::snapshot)
    }

    pub fn validate_session(&self, session_id: &str) -> bool {
        self.inner
            .lock()
            .map(|inner| inner.sessions.contains_key(session_id))
            .unwrap_or(false)
    }

    pub fn touch_session(&self, session_id: &str) -> bool {
        let Ok(mut inner) = self.inner.lock() else { return false };
        match inner.sessions.get_mut(session_id) {
            Some(entry) => {
                entry.last_active = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Remove a session immediately (quit, disconnect). Returns the final
    /// snapshot so the caller can notify the node and stop its listener.
    pub fn expire_session(&self, session_id: &str) -> Option<SessionSnapshot> {
        let Ok(mut inner) = self.inner.lock() else { return None };
        let entry = inner.sessions.remove(session_id)?;
        if let Some(ref node_id) = entry.node_id {
            inner.by_node.remove(node_id);
        }
        tracing::info!(session_id = %session_id, username = ?entry.username, "session expired");
        Some(entry.snapshot())
    }

    pub fn set_current_room(&self, session_id: &str, room_id: i64) {
        self.with_entry(session_id, |entry| entry.current_room = Some(room_id));
    }

    pub fn set_workflow(&self, session_id: &str, state: WorkflowState) {
        self.with_entry(session_id, |entry| entry.workflow = Some(state));
    }

    pub fn get_workflow(&self, session_id: &str) -> Option<WorkflowState> {
        let inner = self.inner.lock().ok()?;
        inner.sessions.get(session_id).and_then(|entry| entry.workflow.clone())
    }

    pub fn clear_workflow(&self, session_id: &str) {
        self.with_entry(session_id, |entry| entry.workflow = None);
    }

    pub fn mark_logged_in(&self, session_id: &str, logged_in: bool) {
        self.with_entry(session_id, |entry| entry.logged_in = logged_in);
    }

    pub fn mark_username(&self, session_id: &str, username: Option<&str>) {
        self.with_entry(session_id, |entry| entry.username = username.map(str::to_owned));
    }

    /// Queue an outbound packet on the session's outbox. Returns false if
    /// the session is gone.
    pub fn push_to_session(&self, session_id: &str, packet: ToUser) -> bool {
        let Ok(inner) = self.inner.lock() else { return false };
        match inner.sessions.get(session_id) {
            Some(entry) => entry.outbox_tx.send(packet).is_ok(),
            None => false,
        }
    }

    /// Hand the outbox receiver to the session's listener. Yields `Some`
    /// exactly once per session.
    pub fn take_outbox(
        &self,
        session_id: &str,
    ) -> Option<tokio::sync::mpsc::UnboundedReceiver<ToUser>> {
        let Ok(mut inner) = self.inner.lock() else { return None };
        inner.sessions.get_mut(session_id).and_then(|entry| entry.outbox_rx.take())
    }

    /// Usernames of logged-in sessions, for the who listing.
    pub fn active_usernames(&self) -> Vec<String> {
        let Ok(inner) = self.inner.lock() else { return Vec::new() };
        let mut names: Vec<String> = inner
            .sessions
            .values()
            .filter(|entry| entry.logged_in)
            .filter_map(|entry| entry.username.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn session_count(&self) -> usize {
        self.inner.lock().map(|inner| inner.sessions.len()).unwrap_or(0)
    }

    /// Expire every session idle past the timeout. Victims are collected
    /// under the lock; notification runs after it is released.
    pub fn sweep_expired_sessions(&self) {
        let now = Instant::now();
        let victims: Vec<(String, SessionSnapshot)> = {
            let Ok(mut inner) = self.inner.lock() else { return };
            let expired: Vec<String> = inner
                .sessions
                .iter()
                .filter(|(_, entry)| now.duration_since(entry.last_active) > self.timeout)
                .map(|(id, _)| id.clone())
                .collect();
            expired
                .into_iter()
                .filter_map(|id| {
                    let mut entry = inner.sessions.remove(&id)?;
                    entry.workflow = None;
                    if let Some(ref node_id) = entry.node_id {
                        inner.by_node.remove(node_id);
                    }
                    Some((id, entry.snapshot()))
                })
                .collect()
        };

        if victims.is_empty() {
            return;
        }
        let callback = self.on_expiry.lock().ok().and_then(|slot| slot.clone());
        for (session_id, snapshot) in victims {
            tracing::info!(session_id = %session_id, username = ?snapshot.username,
                "session auto-expired");
            if let Some(ref callback) = callback {
                callback(session_id, snapshot, SIGNAL_LOST_NOTICE);
            }
        }
    }

    /// Spawn the periodic sweeper; stops when `cancel` fires.
    pub fn spawn_sweeper(this: &Arc<Self>, cancel: CancellationToken) {
        let manager = Arc::clone(this);
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(SWEEP_INTERVAL);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = timer.tick() => {}
                }
                manager.sweep_expired_sessions();
            }
        });
    }

    fn with_entry(&self, session_id: &str, f: impl FnOnce(&mut SessionEntry)) {
        let Ok(mut inner) = self.inner.lock() else { return };
        if let Some(entry) = inner.sessions.get_mut(session_id) {
            f(entry);
        }
    }
}

fn new_token() -> String {
    let mut bytes = [0u8; TOKEN_LEN];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
