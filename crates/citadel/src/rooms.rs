// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rooms: a doubly-linked chain of message boards with per-user read state.

use std::sync::Arc;

use chrono::Utc;
use tokio_rusqlite::rusqlite::{params, OptionalExtension};

use crate::auth::permissions::PermissionLevel;
use crate::config::Config;
use crate::db::system_rooms;
use crate::db::Db;
use crate::messages::Messages;
use crate::users::User;

#[derive(Debug, Clone)]
pub struct Room {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub read_only: bool,
    pub permission_level: PermissionLevel,
    pub next_neighbor: Option<i64>,
    pub prev_neighbor: Option<i64>,
}

impl Room {
    pub fn can_user_read(&self, user: &User) -> bool {
        if user.permission_level == PermissionLevel::Sysop {
            return true;
        }
        match self.permission_level {
            PermissionLevel::Sysop => false,
            PermissionLevel::Aide => user.permission_level >= PermissionLevel::Aide,
            PermissionLevel::Twit => user.permission_level == PermissionLevel::Twit,
            _ => true,
        }
    }

    pub fn can_user_post(&self, user: &User) -> bool {
        if self.read_only {
            return user.permission_level >= PermissionLevel::Aide;
        }
        self.can_user_read(user)
    }
}

/// Room service over the shared database handle.
#[derive(Clone)]
pub struct Rooms {
    db: Db,
    config: Arc<Config>,
    messages: Messages,
}

impl Rooms {
    pub fn new(db: Db, config: Arc<Config>) -> Self {
        let messages = Messages::new(db.clone());
        Self { db, config, messages }
    }

    pub async fn load(&self, room_id: i64) -> anyhow::Result<Option<Room>> {
        self.db
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT id, name, description, read_only, permission_level,
                             next_neighbor, prev_neighbor
                         FROM rooms WHERE id = ?1",
                        [room_id],
                        row_to_room,
                    )
                    .optional()?)
            })
            .await
    }

    pub async fn get_id_by_name(&self, name: &str) -> anyhow::Result<Option<i64>> {
        let name = name.to_owned();
        self.db
            .call(move |conn| {
                Ok(conn
                    .query_row("SELECT id FROM rooms WHERE name = ?1", [&name], |row| row.get(0))
                    .optional()?)
            })
            .await
    }

    /// Resolve a room by id digits or by name.
    pub async fn resolve(&self, identifier: &str) -> anyhow::Result<Option<Room>> {
        let id = if identifier.chars().all(|c| c.is_ascii_digit()) && !identifier.is_empty() {
            identifier.parse::<i64>().ok()
        } else {
            self.get_id_by_name(identifier).await?
        };
        match id {
            Some(id) => self.load(id).await,
            None => Ok(None),
        }
    }

    pub async fn room_count(&self) -> anyhow::Result<i64> {
        self.db
            .call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM rooms", [], |row| row.get(0))?))
            .await
    }

    pub async fn last_room_id(&self) -> anyhow::Result<i64> {
        self.db
            .call(|conn| {
                Ok(conn.query_row(
                    "SELECT id FROM rooms WHERE next_neighbor IS NULL LIMIT 1",
                    [],
                    |row| row.get(0),
                )?)
            })
            .await
    }

    /// Insert a new room into the chain directly after `after_room_id` and
    /// return its id.
    pub async fn create_after(
        &self,
        name: &str,
        description: &str,
        read_only: bool,
        permission_level: PermissionLevel,
        after_room_id: i64,
    ) -> anyhow::Result<i64> {
        if self.room_count().await? >= i64::from(self.config.bbs.max_rooms) {
            anyhow::bail!("room limit reached ({})", self.config.bbs.max_rooms);
        }
        let name = name.to_owned();
        let description = description.to_owned();
        self.db
            .call(move |conn| {
                let next: Option<i64> = conn.query_row(
                    "SELECT next_neighbor FROM rooms WHERE id = ?1",
                    [after_room_id],
                    |row| row.get(0),
                )?;
                conn.execute(
                    "INSERT INTO rooms (name, description, read_only, permission_level,
                         prev_neighbor, next_neighbor)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        name,
                        description,
                        read_only,
                        permission_level.as_str(),
                        after_room_id,
                        next
                    ],
                )?;
                let new_id = conn.last_insert_rowid();
                conn.execute(
                    "UPDATE rooms SET next_neighbor = ?1 WHERE id = ?2",
                    params![new_id, after_room_id],
                )?;
                if let Some(next) = next {
                    conn.execute(
                        "UPDATE rooms SET prev_neighbor = ?1 WHERE id = ?2",
                        params![new_id, next],
                    )?;
                }
                Ok(new_id)
            })
            .await
    }

    /// Walk the chain forward from `from`, skipping unreadable and ignored
    /// rooms, optionally requiring unread messages.
    pub async fn go_to_next_room(
        &self,
        from: &Room,
        user: &User,
        with_unread: bool,
    ) -> anyhow::Result<Option<Room>> {
        let mut current = from.next_neighbor;
        while let Some(id) = current {
            let Some(candidate) = self.load(id).await? else { break };
            current = candidate.next_neighbor;
            if !candidate.can_user_read(user) {
                continue;
            }
            if self.is_ignored_by(candidate.id, &user.username).await? {
                continue;
            }
            if with_unread && !self.has_unread_messages(candidate.id, &user.username).await? {
                continue;
            }
            return Ok(Some(candidate));
        }
        Ok(None)
    }

    pub async fn message_ids(&self, room_id: i64) -> anyhow::Result<Vec<i64>> {
        self.db
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT message_id FROM room_messages WHERE room_id = ?1 ORDER BY message_id",
                )?;
                let rows = stmt.query_map([room_id], |row| row.get(0))?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await
    }

    pub async fn newest_message_id(&self, room_id: i64) -> anyhow::Result<Option<i64>> {
        self.db
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT message_id FROM room_messages WHERE room_id = ?1
                         ORDER BY message_id DESC LIMIT 1",
                        [room_id],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await
    }

    pub async fn oldest_message_id(&self, room_id: i64) -> anyhow::Result<Option<i64>> {
        self.db
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT message_id FROM room_messages WHERE room_id = ?1
                         ORDER BY message_id LIMIT 1",
                        [room_id],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await
    }

    async fn last_seen(&self, room_id: i64, username: &str) -> anyhow::Result<Option<i64>> {
        let username = username.to_owned();
        self.db
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT last_seen_message_id FROM user_room_state
                         WHERE username = ?1 AND room_id = ?2",
                        params![username, room_id],
                        |row| row.get(0),
                    )
                    .optional()?
                    .flatten())
            })
            .await
    }

    pub async fn has_unread_messages(
        &self,
        room_id: i64,
        username: &str,
    ) -> anyhow::Result<bool> {
        let Some(newest) = self.newest_message_id(room_id).await? else {
            return Ok(false);
        };
        Ok(self.last_seen(room_id, username).await? != Some(newest))
    }

    /// Ids of messages in the room newer than the user's read pointer.
    pub async fn unread_message_ids(
        &self,
        room_id: i64,
        username: &str,
    ) -> anyhow::Result<Vec<i64>> {
        let last_seen = self.last_seen(room_id, username).await?.unwrap_or(0);
        let ids = self.message_ids(room_id).await?;
        Ok(ids.into_iter().filter(|id| *id > last_seen).collect())
    }

    pub async fn mark_seen(
        &self,
        room_id: i64,
        username: &str,
        message_id: i64,
    ) -> anyhow::Result<()> {
        let username = username.to_owned();
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO user_room_state
                         (username, room_id, last_seen_message_id)
                     VALUES (?1, ?2, ?3)",
                    params![username, room_id, message_id],
                )?;
                Ok(())
            })
            .await
    }

    /// Advance the user's read pointer past everything in the room.
    pub async fn skip_to_latest(&self, room_id: i64, username: &str) -> anyhow::Result<()> {
        if let Some(newest) = self.newest_message_id(room_id).await? {
            self.mark_seen(room_id, username, newest).await?;
        }
        Ok(())
    }

    /// Post into a room, pruning the oldest linked message when the room is
    /// at `bbs.max_messages_per_room`.
    pub async fn post_message(
        &self,
        room: &Room,
        sender: &User,
        content: &str,
        recipient: Option<&str>,
    ) -> anyhow::Result<i64> {
        if !room.can_user_post(sender) {
            anyhow::bail!("user {} cannot post in room {}", sender.username, room.name);
        }

        let max_messages = if room.id == system_rooms::MAIL {
            self.config.bbs.mail_message_limit
        } else {
            self.config.bbs.max_messages_per_room
        };
        let count = self.message_ids(room.id).await?.len();
        if count >= max_messages as usize {
            if let Some(oldest) = self.oldest_message_id(room.id).await? {
                self.messages.delete(oldest).await?;
            }
        }

        let msg_id = self.messages.post(&sender.username, content, recipient).await?;
        let room_id = room.id;
        let timestamp = Utc::now().to_rfc3339();
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO room_messages (room_id, message_id, timestamp)
                     VALUES (?1, ?2, ?3)",
                    params![room_id, msg_id, timestamp],
                )?;
                Ok(())
            })
            .await?;
        Ok(msg_id)
    }

    pub async fn is_ignored_by(&self, room_id: i64, username: &str) -> anyhow::Result<bool> {
        let username = username.to_owned();
        self.db
            .call(move |conn| {
                let found: Option<i64> = conn
                    .query_row(
                        "SELECT 1 FROM room_ignores WHERE username = ?1 AND room_id = ?2",
                        params![username, room_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(found.is_some())
            })
            .await
    }

    pub async fn set_ignored(
        &self,
        room_id: i64,
        username: &str,
        ignored: bool,
    ) -> anyhow::Result<()> {
        let username = username.to_owned();
        self.db
            .call(move |conn| {
                if ignored {
                    conn.execute(
                        "INSERT OR IGNORE INTO room_ignores (username, room_id) VALUES (?1, ?2)",
                        params![username, room_id],
                    )?;
                } else {
                    conn.execute(
                        "DELETE FROM room_ignores WHERE username = ?1 AND room_id = ?2",
                        params![username, room_id],
                    )?;
                }
                Ok(())
            })
            .await
    }

    /// All rooms the user may read, in chain order starting from the head.
    pub async fn known_rooms(&self, user: &User) -> anyhow::Result<Vec<Room>> {
        let mut out = Vec::new();
        let head: Option<i64> = self
            .db
            .call(|conn| {
                Ok(conn
                    .query_row(
                        "SELECT id FROM rooms WHERE prev_neighbor IS NULL LIMIT 1",
                        [],
                        |row| row.get(0),
                    )
                    .optional()?)
            })
            .await?;
        let mut current = head;
        let mut visited = std::collections::HashSet::new();
        while let Some(id) = current {
            if !visited.insert(id) {
                tracing::warn!(room_id = id, "cycle detected in room chain");
                break;
            }
            let Some(room) = self.load(id).await? else { break };
            current = room.next_neighbor;
            if room.can_user_read(user) {
                out.push(room);
            }
        }
        Ok(out)
    }
}

fn row_to_room(
    row: &tokio_rusqlite::rusqlite::Row<'_>,
) -> Result<Room, tokio_rusqlite::rusqlite::Error> {
    let permission: String = row.get(4)?;
    Ok(Room {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        read_only: row.get(3)?,
        permission_level: PermissionLevel::parse(&permission).unwrap_or(PermissionLevel::User),
        next_neighbor: row.get(5)?,
        prev_neighbor: row.get(6)?,
    })
}

#[cfg(test)]
#[path = "rooms_tests.rs"]
mod tests;
