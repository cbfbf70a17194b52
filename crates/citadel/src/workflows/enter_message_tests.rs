// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::expect_used)]

use super::*;
use crate::auth::permissions::PermissionLevel;
use crate::test_support::{core, only_text};
use crate::workflows::WorkflowKind;

#[tokio::test]
async fn plain_room_skips_recipient_step() {
    let core = core().await;
    core.add_user("bob", "pw000000", PermissionLevel::User).await;
    let session_id = core.logged_in_session("bob", None);

    let replies = core.start_workflow(&session_id, WorkflowKind::EnterMessage).await;
    assert_eq!(only_text(&replies), "Enter your message. End with a single '.' on a line:");

    assert!(core.workflow_input(&session_id, "line one").await.is_empty());
    assert!(core.workflow_input(&session_id, "line two").await.is_empty());

    let replies = core.workflow_input(&session_id, ".").await;
    let text = only_text(&replies);
    assert!(text.contains("posted in Lobby"), "got {text:?}");
    assert!(core.services.sessions.get_workflow(&session_id).is_none());

    let ids = core.services.rooms.message_ids(system_rooms::LOBBY).await.expect("ids");
    assert_eq!(ids.len(), 1);
    let record =
        core.services.messages.get(ids[0], None).await.expect("get").expect("record");
    assert_eq!(record.content, "line one\nline two");
    assert!(record.recipient.is_none());
}

#[tokio::test]
async fn mail_room_collects_recipient_first() {
    let core = core().await;
    core.add_user("bob", "pw000000", PermissionLevel::User).await;
    core.add_user("alice", "pw000000", PermissionLevel::User).await;
    let session_id = core.logged_in_session("bob", None);
    core.services.sessions.set_current_room(&session_id, system_rooms::MAIL);

    let replies = core.start_workflow(&session_id, WorkflowKind::EnterMessage).await;
    assert_eq!(only_text(&replies), "Enter recipient username:");

    // Unknown recipient re-prompts.
    let replies = core.workflow_input(&session_id, "ghost").await;
    assert_eq!(replies[0].error_code, Some(ErrorCode::InvalidRecipient));

    let replies = core.workflow_input(&session_id, "alice").await;
    assert_eq!(only_text(&replies), "Enter your message. End with a single '.' on a line:");

    core.workflow_input(&session_id, "psst").await;
    let replies = core.workflow_input(&session_id, ".").await;
    assert!(only_text(&replies).contains("posted in Mail"));

    let ids = core.services.rooms.message_ids(system_rooms::MAIL).await.expect("ids");
    let record =
        core.services.messages.get(ids[0], None).await.expect("get").expect("record");
    assert_eq!(record.recipient.as_deref(), Some("alice"));
}

#[tokio::test]
async fn empty_message_is_discarded() {
    let core = core().await;
    core.add_user("bob", "pw000000", PermissionLevel::User).await;
    let session_id = core.logged_in_session("bob", None);

    core.start_workflow(&session_id, WorkflowKind::EnterMessage).await;
    let replies = core.workflow_input(&session_id, ".").await;
    assert_eq!(only_text(&replies), "Empty message discarded.");
    assert!(core.services.sessions.get_workflow(&session_id).is_none());
    assert!(core
        .services
        .rooms
        .message_ids(system_rooms::LOBBY)
        .await
        .expect("ids")
        .is_empty());
}
