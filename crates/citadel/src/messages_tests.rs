// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::expect_used)]

use std::sync::Arc;

use super::*;
use crate::auth::passwords::{generate_salt, hash_password};
use crate::auth::permissions::PermissionLevel;
use crate::config::Config;
use crate::users::UserStatus;

async fn fixtures() -> (Messages, Users) {
    let db = Db::open_in_memory().await.expect("db");
    db.init_schema().await.expect("schema");
    let mut config = Config::default();
    config.auth.failed_login_delay = 0;
    let users = Users::new(db.clone(), Arc::new(config));
    for name in ["alice", "bob"] {
        let salt = generate_salt();
        users
            .create(
                name,
                &hash_password("pw000000", &salt),
                &salt,
                name,
                PermissionLevel::User,
                UserStatus::Active,
            )
            .await
            .expect("create");
    }
    (Messages::new(db), users)
}

#[tokio::test]
async fn post_and_get() {
    let (messages, _) = fixtures().await;
    let id = messages.post("alice", "hello room", None).await.expect("post");
    let record = messages.get(id, None).await.expect("get").expect("some");
    assert_eq!(record.sender, "alice");
    assert_eq!(record.content, "hello room");
    assert!(record.recipient.is_none());
}

#[tokio::test]
async fn empty_content_rejected() {
    let (messages, _) = fixtures().await;
    assert!(messages.post("alice", "   ", None).await.is_err());
}

#[tokio::test]
async fn private_messages_hidden_from_third_parties() {
    let (messages, users) = fixtures().await;
    let id = messages.post("alice", "psst", Some("bob")).await.expect("post");

    let alice = users.load("alice").await.expect("load").expect("some");
    let bob = users.load("bob").await.expect("load").expect("some");
    let mut eve = alice.clone();
    eve.username = "eve".to_owned();

    assert!(messages.get(id, Some(&alice)).await.expect("get").is_some());
    assert!(messages.get(id, Some(&bob)).await.expect("get").is_some());
    assert!(messages.get(id, Some(&eve)).await.expect("get").is_none());
}

#[tokio::test]
async fn view_marks_blocked_senders() {
    let (messages, users) = fixtures().await;
    let id = messages.post("bob", "spam", None).await.expect("post");
    users.block("alice", "bob").await.expect("block");

    let alice = users.load("alice").await.expect("load").expect("some");
    let record = messages.get(id, None).await.expect("get").expect("some");
    let view = messages.view(&users, record, "Lobby", Some(&alice)).await.expect("view");
    assert!(view.blocked);
    assert_eq!(view.room, "Lobby");
}

#[tokio::test]
async fn summary_truncates() {
    let (messages, _) = fixtures().await;
    let long = "word ".repeat(30);
    let id = messages.post("alice", &long, None).await.expect("post");
    let summary = messages.summary(id).await.expect("summary").expect("some");
    assert!(summary.starts_with(&format!("[{id}] alice:")));
    assert!(summary.chars().count() < long.chars().count());
}

#[tokio::test]
async fn delete_removes_row_and_room_links() {
    let (messages, _) = fixtures().await;
    let id = messages.post("alice", "gone soon", None).await.expect("post");
    assert!(messages.delete(id).await.expect("delete"));
    assert!(messages.get(id, None).await.expect("get").is_none());
    assert!(!messages.delete(id).await.expect("second delete"));
}
