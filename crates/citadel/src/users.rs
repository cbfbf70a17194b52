// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! User accounts: lookup, credentials, permissions, blocks.

use std::fmt;
use std::sync::Arc;

use tokio_rusqlite::rusqlite::{params, OptionalExtension};

use crate::auth::passwords;
use crate::auth::permissions::PermissionLevel;
use crate::config::Config;
use crate::db::Db;

/// Account lifecycle status. Provisional accounts exist mid-registration;
/// active accounts may log in (validation gates the permission level, not
/// the status).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserStatus {
    Provisional,
    Active,
}

impl UserStatus {
    pub const ALL: [Self; 2] = [Self::Provisional, Self::Active];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provisional => "provisional",
            Self::Active => "active",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "provisional" => Some(Self::Provisional),
            "active" => Some(Self::Active),
            _ => None,
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub username: String,
    pub display_name: String,
    pub permission_level: PermissionLevel,
    pub status: UserStatus,
    pub last_login: Option<i64>,
}

/// User service over the shared database handle.
#[derive(Clone)]
pub struct Users {
    db: Db,
    config: Arc<Config>,
}

impl Users {
    pub fn new(db: Db, config: Arc<Config>) -> Self {
        Self { db, config }
    }

    pub async fn username_exists(&self, username: &str) -> anyhow::Result<bool> {
        let username = username.to_owned();
        self.db
            .call(move |conn| {
                let found: Option<i64> = conn
                    .query_row("SELECT 1 FROM users WHERE username = ?1", [&username], |row| {
                        row.get(0)
                    })
                    .optional()?;
                Ok(found.is_some())
            })
            .await
    }

    /// Return the stored capitalization for a case-insensitive match.
    pub async fn actual_username(&self, username: &str) -> anyhow::Result<Option<String>> {
        let username = username.to_owned();
        self.db
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT username FROM users WHERE username = ?1",
                        [&username],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await
    }

    pub async fn count(&self) -> anyhow::Result<i64> {
        self.db
            .call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?))
            .await
    }

    pub async fn create(
        &self,
        username: &str,
        password_hash: &str,
        salt: &[u8],
        display_name: &str,
        permission_level: PermissionLevel,
        status: UserStatus,
    ) -> anyhow::Result<()> {
        if self.count().await? >= i64::from(self.config.bbs.max_users) {
            anyhow::bail!("user limit reached ({})", self.config.bbs.max_users);
        }
        let username = username.to_owned();
        let password_hash = password_hash.to_owned();
        let salt = salt.to_vec();
        let display_name = display_name.to_owned();
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO users (username, password_hash, salt, display_name,
                         permission, status)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        username,
                        password_hash,
                        salt,
                        display_name,
                        permission_level.as_str(),
                        status.as_str()
                    ],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn load(&self, username: &str) -> anyhow::Result<Option<User>> {
        let username = username.to_owned();
        self.db
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT username, display_name, permission, status, last_login
                         FROM users WHERE username = ?1",
                        [&username],
                        |row| {
                            let name: String = row.get(0)?;
                            let display: Option<String> = row.get(1)?;
                            let permission: String = row.get(2)?;
                            let status: String = row.get(3)?;
                            let last_login: Option<i64> = row.get(4)?;
                            Ok(User {
                                display_name: display.unwrap_or_else(|| name.clone()),
                                username: name,
                                permission_level: PermissionLevel::parse(&permission)
                                    .unwrap_or(PermissionLevel::Unverified),
                                status: UserStatus::parse(&status)
                                    .unwrap_or(UserStatus::Provisional),
                                last_login,
                            })
                        },
                    )
                    .optional()?)
            })
            .await
    }

    /// Check a password. A failed check stalls for
    /// `auth.failed_login_delay` to spoil brute-force attempts.
    pub async fn verify_password(&self, username: &str, password: &str) -> anyhow::Result<bool> {
        if password.len() > self.config.auth.max_password_length {
            return Ok(false);
        }
        let username_owned = username.to_owned();
        let stored: Option<(String, Vec<u8>)> = self
            .db
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT password_hash, salt FROM users WHERE username = ?1",
                        [&username_owned],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?)
            })
            .await?;
        let Some((hash, salt)) = stored else {
            return Ok(false);
        };
        if passwords::verify_password(password, &salt, &hash) {
            return Ok(true);
        }
        tracing::warn!(username = %username, "failed login attempt");
        tokio::time::sleep(self.config.auth.failed_login_delay()).await;
        Ok(false)
    }

    /// Verify credentials and return the loaded user on success.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> anyhow::Result<Option<User>> {
        let Some(actual) = self.actual_username(username.trim()).await? else {
            tracing::info!(username = %username, "unknown username");
            return Ok(None);
        };
        if !self.verify_password(&actual, password).await? {
            return Ok(None);
        }
        self.touch_last_login(&actual).await?;
        self.load(&actual).await
    }

    pub async fn set_display_name(&self, username: &str, display_name: &str) -> anyhow::Result<()> {
        self.update_field(username, "display_name", display_name.to_owned()).await
    }

    pub async fn set_permission_level(
        &self,
        username: &str,
        level: PermissionLevel,
    ) -> anyhow::Result<()> {
        self.update_field(username, "permission", level.as_str().to_owned()).await
    }

    pub async fn set_status(&self, username: &str, status: UserStatus) -> anyhow::Result<()> {
        self.update_field(username, "status", status.as_str().to_owned()).await
    }

    pub async fn update_password(
        &self,
        username: &str,
        password_hash: &str,
        salt: &[u8],
    ) -> anyhow::Result<()> {
        let username = username.to_owned();
        let password_hash = password_hash.to_owned();
        let salt = salt.to_vec();
        self.db
            .call(move |conn| {
                conn.execute(
                    "UPDATE users SET password_hash = ?1, salt = ?2 WHERE username = ?3",
                    params![password_hash, salt, username],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn touch_last_login(&self, username: &str) -> anyhow::Result<()> {
        let username = username.to_owned();
        let now = chrono::Utc::now().timestamp();
        self.db
            .call(move |conn| {
                conn.execute(
                    "UPDATE users SET last_login = ?1 WHERE username = ?2",
                    params![now, username],
                )?;
                Ok(())
            })
            .await
    }

    /// Delete the account row. Blocks and room state are left to cascade
    /// cleanup on the next maintenance pass.
    pub async fn delete(&self, username: &str) -> anyhow::Result<()> {
        let username = username.to_owned();
        self.db
            .call(move |conn| {
                conn.execute("DELETE FROM users WHERE username = ?1", [&username])?;
                Ok(())
            })
            .await
    }

    pub async fn block(&self, blocker: &str, blocked: &str) -> anyhow::Result<()> {
        let blocker = blocker.to_owned();
        let blocked = blocked.to_owned();
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO user_blocks (blocker, blocked) VALUES (?1, ?2)",
                    params![blocker, blocked],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn unblock(&self, blocker: &str, blocked: &str) -> anyhow::Result<()> {
        let blocker = blocker.to_owned();
        let blocked = blocked.to_owned();
        self.db
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM user_blocks WHERE blocker = ?1 AND blocked = ?2",
                    params![blocker, blocked],
                )?;
                Ok(())
            })
            .await
    }

    /// Has `viewer` blocked `sender`?
    pub async fn is_blocked(&self, viewer: &str, sender: &str) -> anyhow::Result<bool> {
        let viewer = viewer.to_owned();
        let sender = sender.to_owned();
        self.db
            .call(move |conn| {
                let found: Option<i64> = conn
                    .query_row(
                        "SELECT 1 FROM user_blocks WHERE blocker = ?1 AND blocked = ?2",
                        params![viewer, sender],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(found.is_some())
            })
            .await
    }

    async fn update_field(
        &self,
        username: &str,
        field: &'static str,
        value: String,
    ) -> anyhow::Result<()> {
        let username = username.to_owned();
        self.db
            .call(move |conn| {
                conn.execute(
                    &format!("UPDATE users SET {field} = ?1 WHERE username = ?2"),
                    params![value, username],
                )?;
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
#[path = "users_tests.rs"]
mod tests;
