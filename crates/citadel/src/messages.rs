// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message store: post, fetch, delete, summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::rusqlite::{params, OptionalExtension};

use crate::db::Db;
use crate::users::{User, Users};

const SUMMARY_LEN: usize = 40;

/// Raw message row.
#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub id: i64,
    pub sender: String,
    pub recipient: Option<String>,
    pub content: String,
    pub timestamp: String,
}

/// A message prepared for display: sender resolved, block status applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageView {
    pub id: i64,
    pub sender: String,
    pub display_name: String,
    pub timestamp: String,
    pub room: String,
    pub content: String,
    pub blocked: bool,
    pub recipient: Option<String>,
}

/// Message service over the shared database handle.
#[derive(Clone)]
pub struct Messages {
    db: Db,
}

impl Messages {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn post(
        &self,
        sender: &str,
        content: &str,
        recipient: Option<&str>,
    ) -> anyhow::Result<i64> {
        if content.trim().is_empty() {
            anyhow::bail!("message content is empty");
        }
        let sender = sender.to_owned();
        let content = content.to_owned();
        let recipient = recipient.map(str::to_owned);
        let timestamp = Utc::now().to_rfc3339();
        let id = self
            .db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO messages (sender, recipient, content, timestamp)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![sender, recipient, content, timestamp],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        tracing::debug!(message_id = id, "message posted");
        Ok(id)
    }

    /// Fetch a message. Private messages are only returned to their sender
    /// or recipient; pass the viewing user to enforce this.
    pub async fn get(
        &self,
        message_id: i64,
        viewer: Option<&User>,
    ) -> anyhow::Result<Option<MessageRecord>> {
        let record = self
            .db
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT id, sender, recipient, content, timestamp
                         FROM messages WHERE id = ?1",
                        [message_id],
                        row_to_record,
                    )
                    .optional()?)
            })
            .await?;
        let Some(record) = record else {
            return Ok(None);
        };
        if let (Some(recipient), Some(viewer)) = (&record.recipient, viewer) {
            if record.sender != viewer.username && *recipient != viewer.username {
                return Ok(None);
            }
        }
        Ok(Some(record))
    }

    pub async fn get_many(&self, message_ids: &[i64]) -> anyhow::Result<Vec<MessageRecord>> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = message_ids.to_vec();
        self.db
            .call(move |conn| {
                let placeholders =
                    ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
                let sql = format!(
                    "SELECT id, sender, recipient, content, timestamp
                     FROM messages WHERE id IN ({placeholders}) ORDER BY id"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(
                    tokio_rusqlite::rusqlite::params_from_iter(ids.iter()),
                    row_to_record,
                )?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await
    }

    pub async fn delete(&self, message_id: i64) -> anyhow::Result<bool> {
        let changed = self
            .db
            .call(move |conn| {
                let n = conn.execute("DELETE FROM messages WHERE id = ?1", [message_id])?;
                conn.execute("DELETE FROM room_messages WHERE message_id = ?1", [message_id])?;
                Ok(n)
            })
            .await?;
        Ok(changed > 0)
    }

    /// A one-line "[id] sender: truncated content" summary.
    pub async fn summary(&self, message_id: i64) -> anyhow::Result<Option<String>> {
        let Some(record) = self.get(message_id, None).await? else {
            return Ok(None);
        };
        let mut content: String = record.content.chars().take(SUMMARY_LEN).collect();
        if record.content.chars().count() > SUMMARY_LEN {
            content.push('…');
        }
        let content = content.replace('\n', " ");
        Ok(Some(format!("[{}] {}: {}", record.id, record.sender, content)))
    }

    /// Build the display form of a record: resolve the sender's display
    /// name and the viewer's block list.
    pub async fn view(
        &self,
        users: &Users,
        record: MessageRecord,
        room_name: &str,
        viewer: Option<&User>,
    ) -> anyhow::Result<MessageView> {
        let display_name = match users.load(&record.sender).await? {
            Some(sender) => sender.display_name,
            None => record.sender.clone(),
        };
        let blocked = match viewer {
            Some(viewer) => users.is_blocked(&viewer.username, &record.sender).await?,
            None => false,
        };
        Ok(MessageView {
            id: record.id,
            sender: record.sender,
            display_name,
            timestamp: record.timestamp,
            room: room_name.to_owned(),
            content: record.content,
            blocked,
            recipient: record.recipient,
        })
    }
}

fn row_to_record(
    row: &tokio_rusqlite::rusqlite::Row<'_>,
) -> Result<MessageRecord, tokio_rusqlite::rusqlite::Error> {
    Ok(MessageRecord {
        id: row.get(0)?,
        sender: row.get(1)?,
        recipient: row.get(2)?,
        content: row.get(3)?,
        timestamp: row.get(4)?,
    })
}

/// Render an RFC 3339 timestamp for terminal display.
pub fn format_timestamp(raw: &str) -> String {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => dt.with_timezone(&Utc).format("%Y-%m-%d %H:%M").to_string(),
        Err(_) => raw.to_owned(),
    }
}

#[cfg(test)]
#[path = "messages_tests.rs"]
mod tests;
