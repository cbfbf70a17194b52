// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Low-level packet transmission: chunking, ACK tracking, retries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::MeshcoreConfig;
use crate::messages::{format_timestamp, MessageView};
use crate::transport::meshcore::codec::chunk_message;
use crate::transport::meshcore::device::{
    DeviceError, DeviceResult, RadioDevice, RetryPolicy, SendReply,
};
use crate::transport::packets::ToUser;

/// ACK entries older than this never satisfy a waiter.
const ACK_MAX_AGE: Duration = Duration::from_secs(20);

/// Poll step while waiting for an ACK.
const ACK_POLL: Duration = Duration::from_millis(250);

/// Delay between attempts in the manual retry wrapper.
const RETRY_DELAY: Duration = Duration::from_secs(1);

pub struct ProtocolHandler {
    device: Arc<dyn RadioDevice>,
    config: MeshcoreConfig,
    acks: Mutex<HashMap<String, Instant>>,
}

impl ProtocolHandler {
    pub fn new(device: Arc<dyn RadioDevice>, config: MeshcoreConfig) -> Arc<Self> {
        Arc::new(Self { device, config, acks: Mutex::new(HashMap::new()) })
    }

    /// Record an incoming ACK. An existing fresh entry keeps its original
    /// stamp; a stale one is refreshed.
    pub fn handle_ack(&self, code: &str) {
        tracing::debug!(code = %code, "ack received");
        let Ok(mut acks) = self.acks.lock() else { return };
        let now = Instant::now();
        match acks.get_mut(code) {
            Some(stamp) if now.duration_since(*stamp) > ACK_MAX_AGE => *stamp = now,
            Some(_) => {}
            None => {
                acks.insert(code.to_owned(), now);
            }
        }
    }

    /// Wait up to `timeout` for an ACK matching `code`. A stale entry is
    /// discarded, never matched.
    pub async fn wait_for_ack(&self, code: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let Ok(mut acks) = self.acks.lock() else { return false };
                if let Some(stamp) = acks.get(code).copied() {
                    acks.remove(code);
                    if stamp.elapsed() <= ACK_MAX_AGE {
                        return true;
                    }
                }
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(ACK_POLL).await;
        }
    }

    /// Render and send one or more packets to a node, chunked and paced.
    /// Returns the final chunk's ACK outcome; intermediate failures are
    /// logged and do not abort the remainder.
    pub async fn send_to_node(
        &self,
        node_id: &str,
        username: &str,
        packets: &[ToUser],
    ) -> DeviceResult<bool> {
        let mut last = true;
        for packet in packets {
            let text = match &packet.message {
                Some(view) => format_message(view),
                None => packet.text.clone(),
            };
            last = self.send_text(node_id, username, &text).await?;
        }
        Ok(last)
    }

    /// Chunk and send a single text, pacing chunks by the configured
    /// inter-packet delay. Returns whether the final chunk was ACKed.
    pub async fn send_text(
        &self,
        node_id: &str,
        username: &str,
        text: &str,
    ) -> DeviceResult<bool> {
        let chunks = chunk_message(text, self.config.max_packet_size);
        let delay = self.config.inter_packet_delay();
        let mut sent = false;
        for chunk in &chunks {
            sent = self.send_packet(node_id, username, chunk).await?;
            if !sent {
                tracing::warn!(node_id = %node_id, "chunk not acknowledged");
            }
            tokio::time::sleep(delay).await;
        }
        Ok(sent)
    }

    /// Send one radio-safe chunk and block until its ACK arrives or the
    /// timeout passes. `Ok(false)` means no ACK or an ERROR-typed reply;
    /// `Err` means the link itself failed after retries.
    pub async fn send_packet(
        &self,
        node_id: &str,
        username: &str,
        chunk: &str,
    ) -> DeviceResult<bool> {
        tracing::debug!(
            node_id = %node_id,
            username = %username,
            bytes = chunk.len(),
            "sending packet"
        );

        let reply = match self.send_with_retry(node_id, chunk).await {
            Ok(reply) => reply,
            Err(DeviceError::Command(e)) => {
                tracing::error!(node_id = %node_id, err = %e, "device refused packet");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let expected_ack = hex::encode(&reply.expected_ack);
        let timeout = self.config.ack_timeout();
        tracing::debug!(code = %expected_ack, timeout_secs = timeout.as_secs(), "awaiting ack");

        if self.wait_for_ack(&expected_ack, timeout).await {
            return Ok(true);
        }
        // ACK timeouts are routine on a lossy mesh.
        tracing::debug!(node_id = %node_id, code = %expected_ack, "ack timeout");
        Ok(false)
    }

    async fn send_with_retry(&self, node_id: &str, chunk: &str) -> DeviceResult<SendReply> {
        if self.device.supports_retry() {
            let policy = RetryPolicy {
                max_attempts: self.config.max_retries,
                max_flood_attempts: self.config.max_flood_attempts,
                flood_after: self.config.flood_after,
                timeout: self.config.send_timeout(),
            };
            return self.device.send_msg_with_retry(node_id, chunk, policy).await;
        }

        let attempts = self.config.max_retries.max(1);
        let mut last_err = DeviceError::Io("no send attempts made".to_owned());
        for attempt in 1..=attempts {
            match self.device.send_msg(node_id, chunk).await {
                Ok(reply) => return Ok(reply),
                Err(DeviceError::Command(e)) => {
                    // The device is answering; retrying won't change its mind.
                    return Err(DeviceError::Command(e));
                }
                Err(e) => {
                    tracing::warn!(attempt, err = %e, "send attempt failed");
                    last_err = e;
                }
            }
            if attempt < attempts {
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
        Err(last_err)
    }

    /// Pending-ACK table size, for diagnostics.
    pub fn pending_acks(&self) -> usize {
        self.acks.lock().map(|a| a.len()).unwrap_or(0)
    }
}

/// Render a structured BBS message for the wire.
pub(crate) fn format_message(view: &MessageView) -> String {
    let to_str = match &view.recipient {
        Some(recipient) => format!(" To: {recipient}"),
        None => String::new(),
    };
    let header = format!(
        "[{}] From: {} ({}){} - {}",
        view.id,
        view.display_name,
        view.sender,
        to_str,
        format_timestamp(&view.timestamp)
    );
    let content =
        if view.blocked { "[Message from blocked sender]" } else { view.content.as_str() };
    format!("{header}\n{content}")
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
