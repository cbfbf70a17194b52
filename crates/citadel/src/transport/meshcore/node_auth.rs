// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-node password cache. A node that authenticated within the window is
//! logged back in without a password prompt.

use std::sync::Arc;

use chrono::Utc;
use tokio_rusqlite::rusqlite::{params, OptionalExtension};

use crate::config::Config;
use crate::db::Db;

#[derive(Clone)]
pub struct NodeAuth {
    db: Db,
    config: Arc<Config>,
}

impl NodeAuth {
    pub fn new(db: Db, config: Arc<Config>) -> Self {
        Self { db, config }
    }

    /// The cached username for `node_id`, if the cache row exists, names a
    /// user, and is younger than `auth.password_cache_duration`.
    pub async fn has_cache(&self, node_id: &str) -> anyhow::Result<Option<String>> {
        let node_id_owned = node_id.to_owned();
        let row: Option<(i64, Option<String>)> = self
            .db
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT last_pw_use, username FROM mc_passwd_cache WHERE node_id = ?1",
                        [&node_id_owned],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?)
            })
            .await?;
        let Some((last_pw_use, username)) = row else {
            return Ok(None);
        };
        let max_age = self.config.auth.password_cache_duration().as_secs() as i64;
        if Utc::now().timestamp() - last_pw_use > max_age {
            tracing::debug!(node_id = %node_id, "password cache expired");
            return Ok(None);
        }
        Ok(username)
    }

    /// Record a fresh password use for the node, binding the username.
    pub async fn touch(&self, username: &str, node_id: &str) -> anyhow::Result<()> {
        let username = username.to_owned();
        let node_id = node_id.to_owned();
        let now = Utc::now().timestamp();
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO mc_passwd_cache (node_id, username, last_pw_use)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT(node_id) DO UPDATE SET
                         username = excluded.username,
                         last_pw_use = excluded.last_pw_use",
                    params![node_id, username, now],
                )?;
                Ok(())
            })
            .await
    }

    /// Drop the cache row. Only called on explicit logout; involuntary
    /// expiry keeps the cache so the user can auto-relogin.
    pub async fn clear(&self, node_id: &str) -> anyhow::Result<()> {
        let node_id_owned = node_id.to_owned();
        self.db
            .call(move |conn| {
                conn.execute("DELETE FROM mc_passwd_cache WHERE node_id = ?1", [&node_id_owned])?;
                Ok(())
            })
            .await?;
        tracing::info!(node_id = %node_id, "removed node from password cache");
        Ok(())
    }
}

#[cfg(test)]
#[path = "node_auth_tests.rs"]
mod tests;
