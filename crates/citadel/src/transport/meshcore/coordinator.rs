// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session listeners draining session outboxes through the protocol
//! handler.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::MeshcoreConfig;
use crate::session::SessionManager;
use crate::transport::meshcore::device::DeviceError;
use crate::transport::meshcore::disconnect_session;
use crate::transport::meshcore::protocol::ProtocolHandler;

/// Pause after a link-level error before draining again.
const IO_ERROR_BACKOFF: Duration = Duration::from_secs(2);

pub struct SessionCoordinator {
    pub(crate) sessions: Arc<SessionManager>,
    pub(crate) protocol: Arc<ProtocolHandler>,
    config: MeshcoreConfig,
    listeners: Mutex<HashMap<String, (JoinHandle<()>, CancellationToken)>>,
}

impl SessionCoordinator {
    pub fn new(
        sessions: Arc<SessionManager>,
        protocol: Arc<ProtocolHandler>,
        config: MeshcoreConfig,
    ) -> Arc<Self> {
        Arc::new(Self { sessions, protocol, config, listeners: Mutex::new(HashMap::new()) })
    }

    pub fn active_listeners(&self) -> usize {
        self.listeners.lock().map(|l| l.len()).unwrap_or(0)
    }

    /// Start a listener for the session if none is running. The listener
    /// owns the session's outbox receiver.
    pub fn start_listener(this: &Arc<Self>, session_id: &str) {
        {
            let Ok(listeners) = this.listeners.lock() else { return };
            if listeners.contains_key(session_id) {
                return;
            }
        }
        let Some(mut outbox) = this.sessions.take_outbox(session_id) else {
            tracing::warn!(session_id = %session_id, "no outbox available for listener");
            return;
        };

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let coordinator = Arc::clone(this);
        let session_id_owned = session_id.to_owned();

        let handle = tokio::spawn(async move {
            let session_id = session_id_owned;
            tracing::info!(session_id = %session_id, "starting BBS listener");
            let delay = coordinator.config.inter_packet_delay();

            loop {
                let packet = tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    packet = outbox.recv() => packet,
                };
                let Some(packet) = packet else {
                    // Outbox closed: the session is gone.
                    break;
                };
                let Some(state) = coordinator.sessions.get_session_state(&session_id) else {
                    tracing::info!(session_id = %session_id,
                        "session no longer exists, terminating listener");
                    break;
                };
                let Some(node_id) = state.node_id.clone() else {
                    tracing::debug!(session_id = %session_id,
                        "session has no node, dropping outbound packet");
                    continue;
                };
                let username = state.username.clone().unwrap_or_default();

                tokio::time::sleep(delay).await;
                match coordinator.protocol.send_to_node(&node_id, &username, &[packet]).await {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::warn!(session_id = %session_id,
                            "no ack from node, disconnecting");
                        disconnect_session(
                            &coordinator.sessions,
                            &coordinator.protocol,
                            &coordinator,
                            &session_id,
                        )
                        .await;
                        break;
                    }
                    Err(DeviceError::Io(e)) => {
                        // Link trouble is usually transient; back off and
                        // keep the listener alive.
                        tracing::warn!(session_id = %session_id, err = %e,
                            "link error in listener, retrying shortly");
                        tokio::time::sleep(IO_ERROR_BACKOFF).await;
                    }
                    Err(DeviceError::Command(e)) => {
                        // The packet itself is unsendable; skip it.
                        tracing::error!(session_id = %session_id, err = %e,
                            "device refused packet, skipping message");
                    }
                }
            }
            tracing::info!(session_id = %session_id, "BBS listener terminated");
        });

        if let Ok(mut listeners) = this.listeners.lock() {
            listeners.insert(session_id.to_owned(), (handle, cancel));
        }
    }

    /// Cancel and forget the session's listener. Safe to call when none
    /// exists, including from the listener's own task.
    pub fn cleanup_listener(&self, session_id: &str) {
        let entry = {
            let Ok(mut listeners) = self.listeners.lock() else { return };
            listeners.remove(session_id)
        };
        match entry {
            Some((handle, cancel)) => {
                tracing::info!(session_id = %session_id, "cancelling BBS listener");
                cancel.cancel();
                handle.abort();
            }
            None => {
                tracing::debug!(session_id = %session_id, "no listener to clean up");
            }
        }
    }

    /// Cancel every listener and wait for them to wind down.
    pub async fn shutdown(&self) {
        let entries: Vec<(String, (JoinHandle<()>, CancellationToken))> = {
            let Ok(mut listeners) = self.listeners.lock() else { return };
            listeners.drain().collect()
        };
        if entries.is_empty() {
            return;
        }
        tracing::info!(count = entries.len(), "shutting down BBS listeners");
        for (_, (handle, cancel)) in entries {
            cancel.cancel();
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
