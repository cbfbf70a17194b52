// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport engines and their supervisor.

pub mod cli;
pub mod meshcore;
pub mod packets;
pub mod prompt;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::commands::CommandRegistry;
use crate::state::Services;
use crate::transport::cli::CliEngine;
use crate::transport::meshcore::device::RadioDevice;
use crate::transport::meshcore::sched::{spawn_watchdog, WatchdogFeeder};
use crate::transport::meshcore::MeshEngine;
use crate::workflows::WorkflowRegistry;

/// Owns the transport engines and the watchdog that restarts the mesh
/// engine when its event flow stalls.
pub struct TransportManager {
    services: Services,
    mesh: Arc<MeshEngine>,
    cli: Arc<CliEngine>,
    feeder: tokio::sync::Mutex<Option<WatchdogFeeder>>,
    watchdog: tokio::sync::Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl TransportManager {
    pub fn new(
        services: Services,
        registry: Arc<CommandRegistry>,
        workflows: Arc<WorkflowRegistry>,
        device: Arc<dyn RadioDevice>,
    ) -> Arc<Self> {
        let mesh = MeshEngine::new(
            services.clone(),
            Arc::clone(&registry),
            Arc::clone(&workflows),
            device,
        );
        let cli = CliEngine::new(services.clone(), registry, workflows);
        Arc::new(Self {
            services,
            mesh,
            cli,
            feeder: tokio::sync::Mutex::new(None),
            watchdog: tokio::sync::Mutex::new(None),
        })
    }

    pub async fn start(this: &Arc<Self>) -> anyhow::Result<()> {
        tracing::info!("starting transport manager");

        let timeout = this.services.config.transport.meshcore.watchdog_timeout();
        let cancel = CancellationToken::new();
        let manager = Arc::clone(this);
        let (feeder, handle) = spawn_watchdog(timeout, cancel.clone(), move || {
            let manager = Arc::clone(&manager);
            async move {
                manager.restart_meshcore().await;
            }
        });
        *this.watchdog.lock().await = Some((cancel, handle));
        *this.feeder.lock().await = Some(feeder.clone());

        CliEngine::start(&this.cli).await?;
        this.mesh.start(feeder).await?;

        tracing::info!("transport manager started");
        Ok(())
    }

    /// Stop-then-start of the mesh engine, invoked by the watchdog.
    pub async fn restart_meshcore(&self) {
        tracing::warn!("restarting mesh engine");
        self.mesh.stop().await;
        let feeder = self.feeder.lock().await.clone();
        let Some(feeder) = feeder else {
            tracing::error!("no watchdog feeder available for restart");
            return;
        };
        if let Err(e) = self.mesh.start(feeder).await {
            tracing::error!(err = %e, "mesh engine restart failed");
        } else {
            tracing::info!("mesh engine restarted");
        }
    }

    /// Full shutdown: schedulers and watchdog first, then engines.
    pub async fn stop(&self) {
        tracing::info!("stopping transport manager");
        if let Some((cancel, handle)) = self.watchdog.lock().await.take() {
            cancel.cancel();
            let _ = handle.await;
        }
        self.mesh.stop().await;
        self.cli.stop().await;
        tracing::info!("transport manager stopped");
    }
}
