// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The mesh transport engine: radio bring-up, event dispatch, and the
//! wiring between protocol, router, coordinator, and contact manager.

pub mod codec;
pub mod contacts;
pub mod coordinator;
pub mod dedupe;
pub mod device;
pub mod node_auth;
pub mod protocol;
pub mod router;
pub mod sched;

use std::sync::Arc;

use anyhow::Context;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::commands::processor::CommandProcessor;
use crate::commands::CommandRegistry;
use crate::session::{SessionManager, SIGNAL_LOST_NOTICE};
use crate::state::Services;
use crate::transport::meshcore::contacts::ContactManager;
use crate::transport::meshcore::coordinator::SessionCoordinator;
use crate::transport::meshcore::dedupe::{MessageDeduplicator, DEFAULT_TTL};
use crate::transport::meshcore::device::{DeviceEvent, RadioDevice};
use crate::transport::meshcore::protocol::ProtocolHandler;
use crate::transport::meshcore::router::MessageRouter;
use crate::transport::meshcore::sched::{spawn_advert_scheduler, WatchdogFeeder};
use crate::workflows::WorkflowRegistry;

/// Expire a session and stop its listener, notifying the node first.
/// Radio failures during the notice are expected and ignored.
pub(crate) async fn disconnect_session(
    sessions: &SessionManager,
    protocol: &ProtocolHandler,
    coordinator: &SessionCoordinator,
    session_id: &str,
) {
    let Some(state) = sessions.get_session_state(session_id) else {
        coordinator.cleanup_listener(session_id);
        return;
    };
    if let Some(ref node_id) = state.node_id {
        let username = state.username.clone().unwrap_or_default();
        match protocol.send_text(node_id, &username, SIGNAL_LOST_NOTICE).await {
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(node_id = %node_id, err = %e, "disconnect notice not delivered")
            }
        }
    }
    sessions.expire_session(session_id);
    coordinator.cleanup_listener(session_id);
}

struct Running {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    coordinator: Arc<SessionCoordinator>,
}

/// Orchestrates the mesh transport components. `start` and `stop` are
/// idempotent; the watchdog restarts the engine through them.
pub struct MeshEngine {
    services: Services,
    registry: Arc<CommandRegistry>,
    workflows: Arc<WorkflowRegistry>,
    device: Arc<dyn RadioDevice>,
    running: tokio::sync::Mutex<Option<Running>>,
}

impl MeshEngine {
    pub fn new(
        services: Services,
        registry: Arc<CommandRegistry>,
        workflows: Arc<WorkflowRegistry>,
        device: Arc<dyn RadioDevice>,
    ) -> Arc<Self> {
        Arc::new(Self {
            services,
            registry,
            workflows,
            device,
            running: tokio::sync::Mutex::new(None),
        })
    }

    pub async fn start(&self, feeder: WatchdogFeeder) -> anyhow::Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            tracing::warn!("mesh engine start() called while already running");
            return Ok(());
        }

        let cancel = CancellationToken::new();
        let mut tasks = Vec::new();
        let mc = self.services.config.transport.meshcore.clone();

        self.configure_device().await.context("radio bring-up failed")?;

        let dedupe = MessageDeduplicator::new(DEFAULT_TTL);
        MessageDeduplicator::spawn_sweeper(&dedupe, cancel.clone());

        let protocol = ProtocolHandler::new(Arc::clone(&self.device), mc.clone());
        let coordinator = SessionCoordinator::new(
            Arc::clone(&self.services.sessions),
            Arc::clone(&protocol),
            mc.clone(),
        );
        let processor = CommandProcessor::new(
            self.services.clone(),
            Arc::clone(&self.registry),
            Arc::clone(&self.workflows),
        );
        let router = MessageRouter::new(
            self.services.clone(),
            Arc::clone(&self.registry),
            Arc::clone(&self.workflows),
            processor,
            Arc::clone(&protocol),
            Arc::clone(&coordinator),
            Arc::clone(&dedupe),
        );

        let contact_manager = ContactManager::new(
            Arc::clone(&self.device),
            self.services.db.clone(),
            mc.contact_manager.clone(),
        );
        contact_manager.start().await?;
        let contact_manager = Arc::new(contact_manager);

        // Expired sessions notify their node and lose their listener, even
        // when the notification send fails.
        {
            let protocol = Arc::clone(&protocol);
            let coordinator = Arc::clone(&coordinator);
            self.services.sessions.set_notification_callback(Arc::new(
                move |session_id, snapshot, notice| {
                    let protocol = Arc::clone(&protocol);
                    let coordinator = Arc::clone(&coordinator);
                    tokio::spawn(async move {
                        if let Some(node_id) = snapshot.node_id {
                            let username = snapshot.username.unwrap_or_default();
                            if let Err(e) =
                                protocol.send_text(&node_id, &username, notice).await
                            {
                                tracing::warn!(session_id = %session_id, err = %e,
                                    "expiry notice not delivered");
                            }
                        }
                        coordinator.cleanup_listener(&session_id);
                    });
                },
            ));
        }

        // Event pump: the only consumer of the device's event stream.
        {
            let mut events = self.device.subscribe();
            let router = Arc::clone(&router);
            let protocol = Arc::clone(&protocol);
            let contact_manager = Arc::clone(&contact_manager);
            let pump_cancel = cancel.clone();
            let feeder = feeder.clone();
            tasks.push(tokio::spawn(async move {
                loop {
                    let event = tokio::select! {
                        _ = pump_cancel.cancelled() => break,
                        event = events.recv() => event,
                    };
                    match event {
                        Ok(DeviceEvent::ContactMsgRecv { pubkey_prefix, text }) => {
                            // One feed per ingress, before processing, so a
                            // wedged pipeline still trips the watchdog.
                            feeder.feed();
                            router.handle_contact_msg(&pubkey_prefix, &text).await;
                        }
                        Ok(DeviceEvent::Ack { code }) => {
                            protocol.handle_ack(&code);
                        }
                        Ok(DeviceEvent::Advertisement(advert))
                        | Ok(DeviceEvent::NewContact(advert)) => {
                            if let Err(e) = contact_manager.ingest_advert(&advert).await {
                                tracing::warn!(err = %e, "advert ingest failed");
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(missed = n, "event pump lagged, events dropped");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
                tracing::info!("event pump shut down");
            }));
        }

        tasks.push(spawn_advert_scheduler(
            Arc::clone(&self.device),
            mc.advert_interval(),
            cancel.clone(),
        ));

        self.device.start_auto_fetch().await.context("start_auto_fetch failed")?;

        *running = Some(Running { cancel, tasks, coordinator });
        tracing::info!("mesh transport engine started");
        Ok(())
    }

    /// Ordered teardown. Safe to call repeatedly; failures in one step
    /// never block the next.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            tracing::warn!("mesh engine stop() called when already stopped");
            return;
        };
        tracing::info!("stopping mesh transport engine");

        running.cancel.cancel();
        for task in running.tasks {
            match task.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {}
                Err(e) => tracing::warn!(err = %e, "engine task ended abnormally"),
            }
        }
        running.coordinator.shutdown().await;

        if let Err(e) = self.device.stop_auto_fetch().await {
            tracing::warn!(err = %e, "stop_auto_fetch failed");
        }
        if let Err(e) = self.device.disconnect().await {
            tracing::warn!(err = %e, "device disconnect failed");
        }
        tracing::info!("mesh transport engine shut down");
    }

    /// Apply radio parameters from config. A failed time sync is
    /// non-critical; everything else aborts startup.
    async fn configure_device(&self) -> anyhow::Result<()> {
        let mc = &self.services.config.transport.meshcore;

        let now = chrono::Utc::now().timestamp();
        tracing::info!(unix_secs = now, "setting radio node time");
        if let Err(e) = self.device.set_time(now).await {
            tracing::warn!(err = %e, "unable to sync radio time (non-critical)");
        }

        tracing::info!(
            frequency = mc.frequency,
            bandwidth = mc.bandwidth,
            spreading_factor = mc.spreading_factor,
            coding_rate = mc.coding_rate,
            "setting radio parameters"
        );
        self.device
            .set_radio(mc.frequency, mc.bandwidth, mc.spreading_factor, mc.coding_rate)
            .await
            .context("set_radio failed")?;

        tracing::info!(dbm = mc.tx_power, "setting radio tx power");
        self.device.set_tx_power(mc.tx_power).await.context("set_tx_power failed")?;

        tracing::info!(name = %mc.name, "setting radio node name");
        self.device.set_name(&mc.name).await.context("set_name failed")?;

        if mc.multi_acks {
            self.device.set_multi_acks(true).await.context("set_multi_acks failed")?;
        }

        self.device.ensure_contacts().await.context("ensure_contacts failed")?;
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
