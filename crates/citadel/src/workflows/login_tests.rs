// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::expect_used)]

use super::*;
use crate::auth::permissions::PermissionLevel;
use crate::db::system_rooms;
use crate::test_support::{core, only_text};

#[tokio::test]
async fn happy_path() {
    let core = core().await;
    core.add_user("bob", "secret", PermissionLevel::User).await;
    let session_id = core.services.sessions.create_session(Some("abcd1234abcd1234"));

    let replies = core.start_workflow(&session_id, WorkflowKind::Login).await;
    assert_eq!(only_text(&replies), "Enter your username:");

    let replies = core.workflow_input(&session_id, "bob").await;
    assert_eq!(only_text(&replies), "Enter your password:");
    assert_eq!(replies[0].hints.kind, Some(crate::transport::packets::HintKind::Password));

    let replies = core.workflow_input(&session_id, "secret").await;
    assert_eq!(only_text(&replies), "Welcome, bob! You are now logged in.");

    let state = core.services.sessions.get_session_state(&session_id).expect("state");
    assert!(state.logged_in);
    assert_eq!(state.username.as_deref(), Some("bob"));
    assert!(state.workflow.is_none());
    assert_eq!(state.current_room, Some(system_rooms::LOBBY));
}

#[tokio::test]
async fn login_refreshes_node_password_cache() {
    let core = core().await;
    core.add_user("bob", "secret", PermissionLevel::User).await;
    let session_id = core.services.sessions.create_session(Some("abcd1234abcd1234"));

    core.start_workflow(&session_id, WorkflowKind::Login).await;
    core.workflow_input(&session_id, "bob").await;
    core.workflow_input(&session_id, "secret").await;

    let node_auth = crate::transport::meshcore::node_auth::NodeAuth::new(
        core.services.db.clone(),
        std::sync::Arc::clone(&core.services.config),
    );
    assert_eq!(
        node_auth.has_cache("abcd1234abcd1234").await.expect("cache").as_deref(),
        Some("bob")
    );
}

#[tokio::test]
async fn three_strikes_blocks() {
    let core = core().await;
    core.add_user("bob", "secret", PermissionLevel::User).await;
    let session_id = core.services.sessions.create_session(None);

    core.start_workflow(&session_id, WorkflowKind::Login).await;

    // Two failed passwords, then the third strike.
    for _ in 0..2 {
        core.workflow_input(&session_id, "bob").await;
        let replies = core.workflow_input(&session_id, "wrong").await;
        assert_eq!(replies[0].error_code, Some(ErrorCode::LoginFailed));
    }
    core.workflow_input(&session_id, "bob").await;
    let replies = core.workflow_input(&session_id, "wrong again").await;

    assert_eq!(replies[0].error_code, Some(ErrorCode::LoginBlocked));
    assert!(replies[0].text.contains("Too many failed login attempts"));
    assert!(core.services.sessions.get_workflow(&session_id).is_none());
}

#[tokio::test]
async fn unknown_username_reprompts() {
    let core = core().await;
    core.add_user("bob", "secret", PermissionLevel::User).await;
    let session_id = core.services.sessions.create_session(None);

    core.start_workflow(&session_id, WorkflowKind::Login).await;
    let replies = core.workflow_input(&session_id, "nobody").await;
    assert_eq!(replies[0].error_code, Some(ErrorCode::InvalidUsername));
    assert!(replies[0].text.contains("not found"));
    assert!(replies[0].text.ends_with("Enter your username:"));

    // Still at the username step; the right name continues normally.
    let replies = core.workflow_input(&session_id, "bob").await;
    assert_eq!(only_text(&replies), "Enter your password:");
}

#[tokio::test]
async fn new_shortcut_switches_to_registration() {
    let core = core().await;
    let session_id = core.services.sessions.create_session(None);

    core.start_workflow(&session_id, WorkflowKind::Login).await;
    let replies = core.workflow_input(&session_id, "new").await;
    assert_eq!(only_text(&replies), "Choose a username to begin registration.");

    let wf = core.services.sessions.get_workflow(&session_id).expect("workflow");
    assert_eq!(wf.kind, WorkflowKind::RegisterUser);
    assert_eq!(wf.step, 1);
}

#[tokio::test]
async fn cancel_unbinds_half_bound_username() {
    let core = core().await;
    core.add_user("bob", "secret", PermissionLevel::User).await;
    let session_id = core.services.sessions.create_session(None);

    core.start_workflow(&session_id, WorkflowKind::Login).await;
    core.workflow_input(&session_id, "bob").await;
    core.services.sessions.mark_username(&session_id, Some("bob"));

    let replies = core.workflow_input(&session_id, "cancel").await;
    assert!(only_text(&replies).contains("Cancelled login workflow"));

    let state = core.services.sessions.get_session_state(&session_id).expect("state");
    assert!(state.username.is_none());
    assert!(state.workflow.is_none());
    assert!(!state.logged_in);
}
