// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mesh-Citadel: a Citadel-style BBS served over a mesh-radio transport
//! and a local admin socket.

pub mod auth;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod messages;
pub mod rooms;
pub mod session;
pub mod state;
pub mod transport;
pub mod users;
pub mod workflows;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::commands::CommandRegistry;
use crate::config::Config;
use crate::db::Db;
use crate::session::SessionManager;
use crate::state::Services;
use crate::transport::meshcore::device::RadioDevice;
use crate::transport::TransportManager;
use crate::workflows::WorkflowRegistry;

/// Wire everything and run until shutdown. The radio handle is supplied by
/// the caller; the engine owns it from here on.
pub async fn run(config: Config, device: Arc<dyn RadioDevice>) -> anyhow::Result<()> {
    let config = Arc::new(config);
    tracing::info!(system = %config.bbs.system_name, "starting");

    let db = Db::open(&config.database.db_path).await?;
    db.init_schema().await?;

    let shutdown = CancellationToken::new();
    let sessions = SessionManager::new(&config);
    SessionManager::spawn_sweeper(&sessions, shutdown.clone());

    let services = Services::new(Arc::clone(&config), db, sessions);
    let registry = Arc::new(CommandRegistry::builtin());
    let workflows = Arc::new(WorkflowRegistry::builtin());

    let transports = TransportManager::new(services, registry, workflows, device);
    TransportManager::start(&transports).await?;

    tracing::info!("startup complete");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");

    shutdown.cancel();
    transports.stop().await;
    Ok(())
}
