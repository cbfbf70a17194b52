// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::expect_used)]

use super::*;

async fn service(cache_days: u64) -> NodeAuth {
    let db = Db::open_in_memory().await.expect("db");
    db.init_schema().await.expect("schema");
    let mut config = Config::default();
    config.auth.password_cache_duration = cache_days;
    NodeAuth::new(db, Arc::new(config))
}

#[tokio::test]
async fn touch_then_lookup() {
    let auth = service(14).await;
    assert!(auth.has_cache("aaaa000011112222").await.expect("lookup").is_none());

    auth.touch("bob", "aaaa000011112222").await.expect("touch");
    assert_eq!(
        auth.has_cache("aaaa000011112222").await.expect("lookup").as_deref(),
        Some("bob")
    );
}

#[tokio::test]
async fn expired_cache_is_invalid() {
    // Zero-day window: any stored stamp is immediately stale.
    let auth = service(0).await;
    auth.touch("bob", "aaaa000011112222").await.expect("touch");

    // Backdate the row past the (zero) window.
    auth.db
        .call(|conn| {
            conn.execute("UPDATE mc_passwd_cache SET last_pw_use = last_pw_use - 10", [])?;
            Ok(())
        })
        .await
        .expect("backdate");
    assert!(auth.has_cache("aaaa000011112222").await.expect("lookup").is_none());
}

#[tokio::test]
async fn row_without_username_is_invalid() {
    let auth = service(14).await;
    auth.db
        .call(|conn| {
            conn.execute(
                "INSERT INTO mc_passwd_cache (node_id, username, last_pw_use)
                 VALUES ('ffff000011112222', NULL, strftime('%s','now'))",
                [],
            )?;
            Ok(())
        })
        .await
        .expect("insert");
    assert!(auth.has_cache("ffff000011112222").await.expect("lookup").is_none());
}

#[tokio::test]
async fn clear_removes_the_row() {
    let auth = service(14).await;
    auth.touch("bob", "aaaa000011112222").await.expect("touch");
    auth.clear("aaaa000011112222").await.expect("clear");
    assert!(auth.has_cache("aaaa000011112222").await.expect("lookup").is_none());
}
