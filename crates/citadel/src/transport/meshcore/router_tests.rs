// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::expect_used)]

use std::time::Duration;

use super::*;
use crate::auth::permissions::PermissionLevel;
use crate::test_support::{core, TestCore};
use crate::transport::meshcore::device::mock::MockRadio;
use crate::transport::meshcore::device::{DeviceEvent, RadioDevice};

const NODE: &str = "aabbccdd00112233";

struct Net {
    core: TestCore,
    router: Arc<MessageRouter>,
    radio: Arc<MockRadio>,
    _pump: tokio::task::JoinHandle<()>,
}

async fn net() -> Net {
    let core = core().await;
    let radio = Arc::new(MockRadio::new(true));
    let mc = core.services.config.transport.meshcore.clone();
    let protocol =
        ProtocolHandler::new(Arc::clone(&radio) as Arc<dyn RadioDevice>, mc.clone());
    let coordinator = SessionCoordinator::new(
        Arc::clone(&core.services.sessions),
        Arc::clone(&protocol),
        mc,
    );
    let dedupe = MessageDeduplicator::new(Duration::from_secs(10));
    let router = MessageRouter::new(
        core.services.clone(),
        Arc::clone(&core.registry),
        Arc::clone(&core.workflows),
        Arc::clone(&core.processor),
        Arc::clone(&protocol),
        coordinator,
        dedupe,
    );

    let mut rx = radio.subscribe();
    let pump_protocol = Arc::clone(&protocol);
    let pump = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            if let DeviceEvent::Ack { code } = event {
                pump_protocol.handle_ack(&code);
            }
        }
    });

    Net { core, router, radio, _pump: pump }
}

fn all_sent(net: &Net) -> String {
    net.radio
        .sent_packets()
        .iter()
        .map(|p| p.text.clone())
        .collect::<Vec<_>>()
        .join("\n---\n")
}

#[tokio::test]
async fn first_contact_starts_login() {
    let net = net().await;
    net.router.handle_contact_msg(NODE, "hello?").await;

    let sent = all_sent(&net);
    assert!(sent.contains("Enter your username:"), "got {sent:?}");
    let session_id =
        net.core.services.sessions.get_session_by_node_id(NODE).expect("session");
    let wf = net.core.services.sessions.get_workflow(&session_id).expect("workflow");
    assert_eq!(wf.kind, WorkflowKind::Login);
}

#[tokio::test]
async fn full_login_conversation_over_the_radio() {
    let net = net().await;
    net.core.add_user("bob", "secret", PermissionLevel::User).await;

    net.router.handle_contact_msg(NODE, "hi").await;
    net.router.handle_contact_msg(NODE, "bob").await;
    net.router.handle_contact_msg(NODE, "secret").await;

    let sent = all_sent(&net);
    assert!(sent.contains("Enter your password:"));
    assert!(sent.contains("Welcome, bob! You are now logged in."));
    // The final reply carries the standard prompt.
    assert!(sent.contains("In Lobby. What now? (H for help)"));

    let session_id =
        net.core.services.sessions.get_session_by_node_id(NODE).expect("session");
    let state = net.core.services.sessions.get_session_state(&session_id).expect("state");
    assert!(state.logged_in);
}

#[tokio::test]
async fn duplicates_within_ttl_are_dropped() {
    let net = net().await;
    net.router.handle_contact_msg(NODE, "hello?").await;
    let sent_before = net.radio.sent_packets().len();

    net.router.handle_contact_msg(NODE, "hello?").await;
    assert_eq!(net.radio.sent_packets().len(), sent_before, "duplicate produced traffic");
}

#[tokio::test]
async fn cached_node_gets_welcome_back_and_text_is_ignored() {
    let net = net().await;
    net.core.add_user("bob", "secret", PermissionLevel::User).await;
    let node_auth = NodeAuth::new(
        net.core.services.db.clone(),
        Arc::clone(&net.core.services.config),
    );
    node_auth.touch("bob", NODE).await.expect("seed cache");

    // "G" arrives but only re-establishes contact; it must not run.
    net.router.handle_contact_msg(NODE, "G").await;

    let sent = all_sent(&net);
    assert!(sent.contains("Welcome back, bob!"), "got {sent:?}");
    assert!(sent.contains("What now? (H for help)"));
    assert!(!sent.contains("You are now in room"), "inbound text was executed");

    let session_id =
        net.core.services.sessions.get_session_by_node_id(NODE).expect("session");
    let state = net.core.services.sessions.get_session_state(&session_id).expect("state");
    assert!(state.logged_in);
    assert_eq!(state.username.as_deref(), Some("bob"));
}

#[tokio::test]
async fn cached_node_with_existing_session_runs_commands() {
    let net = net().await;
    net.core.add_user("bob", "secret", PermissionLevel::User).await;
    let node_auth = NodeAuth::new(
        net.core.services.db.clone(),
        Arc::clone(&net.core.services.config),
    );
    node_auth.touch("bob", NODE).await.expect("seed cache");

    net.router.handle_contact_msg(NODE, "first contact").await;
    net.router.handle_contact_msg(NODE, "W").await;

    let sent = all_sent(&net);
    assert!(sent.contains("Online: bob"), "got {sent:?}");
}

#[tokio::test]
async fn unparseable_command_reports_unknown() {
    let net = net().await;
    net.core.add_user("bob", "secret", PermissionLevel::User).await;
    let node_auth = NodeAuth::new(
        net.core.services.db.clone(),
        Arc::clone(&net.core.services.config),
    );
    node_auth.touch("bob", NODE).await.expect("seed cache");

    net.router.handle_contact_msg(NODE, "contact").await;
    net.router.handle_contact_msg(NODE, "XYZZY please").await;

    let sent = all_sent(&net);
    assert!(sent.contains("Unknown command. H for help."), "got {sent:?}");
}

#[tokio::test]
async fn quit_over_radio_cleans_up_session_and_cache() {
    let net = net().await;
    net.core.add_user("bob", "secret", PermissionLevel::User).await;
    let node_auth = NodeAuth::new(
        net.core.services.db.clone(),
        Arc::clone(&net.core.services.config),
    );
    node_auth.touch("bob", NODE).await.expect("seed cache");

    net.router.handle_contact_msg(NODE, "contact").await;
    net.router.handle_contact_msg(NODE, "Q").await;

    let sent = all_sent(&net);
    assert!(sent.contains("Goodbye!"));
    assert!(net.core.services.sessions.get_session_by_node_id(NODE).is_none());
    // Voluntary logout clears the password cache: next contact logs in
    // from scratch.
    assert!(node_auth.has_cache(NODE).await.expect("cache").is_none());
}
