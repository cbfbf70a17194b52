// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::expect_used)]

use std::sync::Arc;

use super::*;
use crate::auth::passwords::{generate_salt, hash_password};

async fn service() -> Users {
    let db = Db::open_in_memory().await.expect("db");
    db.init_schema().await.expect("schema");
    let mut config = Config::default();
    // Keep failed-password checks fast in tests.
    config.auth.failed_login_delay = 0;
    Users::new(db, Arc::new(config))
}

async fn add_user(users: &Users, username: &str, password: &str, level: PermissionLevel) {
    let salt = generate_salt();
    let hash = hash_password(password, &salt);
    users
        .create(username, &hash, &salt, username, level, UserStatus::Active)
        .await
        .expect("create user");
}

#[tokio::test]
async fn create_load_round_trip() {
    let users = service().await;
    add_user(&users, "bob", "secret", PermissionLevel::User).await;

    assert!(users.username_exists("bob").await.expect("exists"));
    assert!(users.username_exists("BOB").await.expect("exists nocase"));
    assert!(!users.username_exists("alice").await.expect("missing"));

    let bob = users.load("bob").await.expect("load").expect("some");
    assert_eq!(bob.username, "bob");
    assert_eq!(bob.permission_level, PermissionLevel::User);
    assert_eq!(bob.status, UserStatus::Active);
}

#[tokio::test]
async fn authenticate_checks_password() {
    let users = service().await;
    add_user(&users, "Bob", "secret", PermissionLevel::User).await;

    let user = users.authenticate("bob", "secret").await.expect("auth");
    // Stored capitalization wins.
    assert_eq!(user.expect("user").username, "Bob");

    assert!(users.authenticate("bob", "wrong").await.expect("auth").is_none());
    assert!(users.authenticate("nobody", "secret").await.expect("auth").is_none());
}

#[tokio::test]
async fn overlong_password_is_rejected_without_hashing() {
    let users = service().await;
    add_user(&users, "bob", "secret", PermissionLevel::User).await;
    let oversized = "x".repeat(65);
    assert!(!users.verify_password("bob", &oversized).await.expect("verify"));
}

#[tokio::test]
async fn permission_and_status_updates() {
    let users = service().await;
    add_user(&users, "newbie", "secret", PermissionLevel::Unverified).await;

    users.set_permission_level("newbie", PermissionLevel::User).await.expect("promote");
    users.set_status("newbie", UserStatus::Active).await.expect("activate");
    users.set_display_name("newbie", "The Newbie").await.expect("rename");

    let user = users.load("newbie").await.expect("load").expect("some");
    assert_eq!(user.permission_level, PermissionLevel::User);
    assert_eq!(user.display_name, "The Newbie");
}

#[tokio::test]
async fn blocks_are_directional() {
    let users = service().await;
    add_user(&users, "alice", "pw000000", PermissionLevel::User).await;
    add_user(&users, "mallory", "pw000000", PermissionLevel::User).await;

    users.block("alice", "mallory").await.expect("block");
    assert!(users.is_blocked("alice", "mallory").await.expect("blocked"));
    assert!(!users.is_blocked("mallory", "alice").await.expect("reverse"));

    users.unblock("alice", "mallory").await.expect("unblock");
    assert!(!users.is_blocked("alice", "mallory").await.expect("unblocked"));
}

#[tokio::test]
async fn user_limit_enforced() {
    let db = Db::open_in_memory().await.expect("db");
    db.init_schema().await.expect("schema");
    let mut config = Config::default();
    config.bbs.max_users = 1;
    config.auth.failed_login_delay = 0;
    let users = Users::new(db, Arc::new(config));

    add_user(&users, "only", "pw000000", PermissionLevel::User).await;
    let salt = generate_salt();
    let hash = hash_password("pw000000", &salt);
    let err = users
        .create("toomany", &hash, &salt, "toomany", PermissionLevel::User, UserStatus::Active)
        .await;
    assert!(err.is_err());
}
