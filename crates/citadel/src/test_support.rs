// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for unit tests.

#![allow(clippy::expect_used)]

use std::sync::Arc;

use crate::auth::passwords::{generate_salt, hash_password};
use crate::auth::permissions::PermissionLevel;
use crate::commands::parser::parse_command;
use crate::commands::processor::CommandProcessor;
use crate::commands::CommandRegistry;
use crate::config::Config;
use crate::db::{system_rooms, Db};
use crate::session::SessionManager;
use crate::state::Services;
use crate::transport::packets::{FromUser, FromUserPayload, ToUser};
use crate::users::UserStatus;
use crate::workflows::{WorkflowKind, WorkflowRegistry};

pub(crate) struct TestCore {
    pub services: Services,
    pub registry: Arc<CommandRegistry>,
    pub workflows: Arc<WorkflowRegistry>,
    pub processor: Arc<CommandProcessor>,
}

/// Config tuned for tests: no login stall, everything else default.
pub(crate) fn test_config() -> Config {
    let mut config = Config::default();
    config.auth.failed_login_delay = 0;
    config.transport.meshcore.inter_packet_delay = 0.0;
    config.transport.meshcore.ack_timeout = 1;
    config
}

pub(crate) async fn core() -> TestCore {
    core_with(test_config()).await
}

pub(crate) async fn core_with(config: Config) -> TestCore {
    let db = Db::open_in_memory().await.expect("db");
    db.init_schema().await.expect("schema");
    let config = Arc::new(config);
    let sessions = SessionManager::new(&config);
    let services = Services::new(config, db, sessions);
    let registry = Arc::new(CommandRegistry::builtin());
    let workflows = Arc::new(WorkflowRegistry::builtin());
    let processor =
        CommandProcessor::new(services.clone(), Arc::clone(&registry), Arc::clone(&workflows));
    TestCore { services, registry, workflows, processor }
}

impl TestCore {
    pub async fn add_user(&self, username: &str, password: &str, level: PermissionLevel) {
        let salt = generate_salt();
        let hash = hash_password(password, &salt);
        self.services
            .users
            .create(username, &hash, &salt, username, level, UserStatus::Active)
            .await
            .expect("create user");
    }

    /// A logged-in session in the Lobby, optionally bound to a node.
    pub fn logged_in_session(&self, username: &str, node_id: Option<&str>) -> String {
        let session_id = self.services.sessions.create_session(node_id);
        self.services.sessions.mark_username(&session_id, Some(username));
        self.services.sessions.mark_logged_in(&session_id, true);
        self.services.sessions.set_current_room(&session_id, system_rooms::LOBBY);
        session_id
    }

    pub async fn start_workflow(&self, session_id: &str, kind: WorkflowKind) -> Vec<ToUser> {
        self.workflows
            .start_workflow(&self.services, session_id, kind)
            .await
            .expect("start workflow")
    }

    /// Feed raw text into an attached workflow via the processor.
    pub async fn workflow_input(&self, session_id: &str, input: &str) -> Vec<ToUser> {
        self.processor
            .process(FromUser {
                session_id: session_id.to_owned(),
                payload: FromUserPayload::WorkflowResponse(input.to_owned()),
            })
            .await
    }

    /// Parse and run a command line through the processor.
    pub async fn run_command(&self, session_id: &str, line: &str) -> Vec<ToUser> {
        let cmd = parse_command(&self.registry, line).expect("parse command");
        self.processor
            .process(FromUser {
                session_id: session_id.to_owned(),
                payload: FromUserPayload::Command(cmd),
            })
            .await
    }

    pub async fn pending_validation_count(&self) -> i64 {
        self.services
            .db
            .call(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM pending_validations", [], |row| {
                    row.get(0)
                })?)
            })
            .await
            .expect("count")
    }
}

/// The single text of a one-reply response.
pub(crate) fn only_text(replies: &[ToUser]) -> &str {
    assert_eq!(replies.len(), 1, "expected exactly one reply, got {}", replies.len());
    &replies[0].text
}
