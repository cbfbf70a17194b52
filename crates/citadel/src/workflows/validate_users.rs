// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pending-registration review: single-keystroke approve/reject/skip/quit.

use async_trait::async_trait;
use serde_json::Value;

use crate::auth::permissions::PermissionLevel;
use crate::error::ErrorCode;
use crate::transport::packets::{HintKind, PacketHints, ToUser};
use crate::session::WorkflowData;
use crate::workflows::{data_u64, Workflow, WorkflowContext, WorkflowKind};

pub struct ValidateUsersWorkflow;

#[async_trait]
impl Workflow for ValidateUsersWorkflow {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::ValidateUsers
    }

    async fn start(&self, ctx: &WorkflowContext<'_>) -> anyhow::Result<Vec<ToUser>> {
        let pending: Vec<String> = ctx
            .services
            .db
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT username FROM pending_validations ORDER BY submitted_at",
                )?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await?;

        let mut data = ctx.wf_state.data.clone();
        data.insert(
            "pending_users".to_owned(),
            Value::Array(pending.iter().map(|u| Value::String(u.clone())).collect()),
        );
        data.insert("current_index".to_owned(), 0.into());
        ctx.advance(1, data.clone());

        let mut first = self.show_current(ctx, &data).await?;
        first.text =
            format!("USER VALIDATION\nA=approve R=reject S=skip Q=quit\n\n{}", first.text);
        Ok(vec![first])
    }

    async fn handle(&self, ctx: &WorkflowContext<'_>, input: &str) -> anyhow::Result<Vec<ToUser>> {
        match input.trim().to_ascii_lowercase().as_str() {
            "a" | "approve" => self.approve(ctx).await,
            "r" | "reject" => self.reject(ctx).await,
            "s" | "skip" => {
                let data = self.advanced(ctx);
                Ok(vec![self.show_current(ctx, &data).await?])
            }
            "q" | "quit" => {
                ctx.clear();
                Ok(vec![ctx.reply("Validation session ended.")])
            }
            _ => Ok(vec![
                ctx.error(ErrorCode::InvalidCommand, "Invalid command. Use A/R/S/Q.")
            ]),
        }
    }
}

impl ValidateUsersWorkflow {
    fn pending_users(data: &WorkflowData) -> Vec<String> {
        match data.get("pending_users") {
            Some(Value::Array(users)) => {
                users.iter().filter_map(Value::as_str).map(str::to_owned).collect()
            }
            _ => Vec::new(),
        }
    }

    fn current_username(&self, ctx: &WorkflowContext<'_>) -> Option<String> {
        let data = &ctx.wf_state.data;
        let index = data_u64(data, "current_index").unwrap_or(0) as usize;
        Self::pending_users(data).get(index).cloned()
    }

    /// Advance the index in session state and return the updated data.
    fn advanced(&self, ctx: &WorkflowContext<'_>) -> WorkflowData {
        let mut data = ctx.wf_state.data.clone();
        let index = data_u64(&data, "current_index").unwrap_or(0) + 1;
        data.insert("current_index".to_owned(), index.into());
        ctx.advance(1, data.clone());
        data
    }

    async fn show_current(
        &self,
        ctx: &WorkflowContext<'_>,
        data: &WorkflowData,
    ) -> anyhow::Result<ToUser> {
        let users = Self::pending_users(data);
        let mut data = data.clone();
        loop {
            let index = data_u64(&data, "current_index").unwrap_or(0) as usize;
            if index >= users.len() {
                ctx.clear();
                return Ok(ctx.reply("All users processed!"));
            }
            let username = &users[index];

            let user = ctx.services.users.load(username).await?;
            let username_owned = username.clone();
            let validation: Option<(String, Option<String>)> = ctx
                .services
                .db
                .call(move |conn| {
                    use tokio_rusqlite::rusqlite::OptionalExtension;
                    Ok(conn
                        .query_row(
                            "SELECT submitted_at, intro_text FROM pending_validations
                             WHERE username = ?1",
                            [&username_owned],
                            |row| Ok((row.get(0)?, row.get(1)?)),
                        )
                        .optional()?)
                })
                .await?;

            let (Some(user), Some((submitted_at, intro))) = (user, validation) else {
                // Stale entry; move on.
                data.insert(
                    "current_index".to_owned(),
                    (index as u64 + 1).into(),
                );
                ctx.advance(1, data.clone());
                continue;
            };

            let intro = match intro {
                Some(text) if !text.trim().is_empty() => text,
                _ => "No introduction provided.".to_owned(),
            };
            let text = format!(
                "User {}/{}\n{} ({})\nSubmitted: {}\n\nIntroduction:\n{}",
                index + 1,
                users.len(),
                user.username,
                user.display_name,
                submitted_at,
                intro
            );
            let mut hints =
                PacketHints::workflow(self.kind().as_str(), 1, HintKind::Choice);
            hints.options = vec!["a".into(), "r".into(), "s".into(), "q".into()];
            return Ok(ctx.reply(text).with_hints(hints));
        }
    }

    async fn approve(&self, ctx: &WorkflowContext<'_>) -> anyhow::Result<Vec<ToUser>> {
        let Some(username) = self.current_username(ctx) else {
            return Ok(vec![self.show_current(ctx, &ctx.wf_state.data).await?]);
        };
        ctx.services.users.set_permission_level(&username, PermissionLevel::User).await?;
        self.delete_pending(ctx, &username).await?;

        let validator = ctx
            .services
            .sessions
            .get_session_state(ctx.session_id)
            .and_then(|s| s.username)
            .unwrap_or_else(|| "unknown".to_owned());
        tracing::info!(username = %username, validator = %validator,
            "user validated, promoted to USER");

        let data = self.advanced(ctx);
        let mut next = self.show_current(ctx, &data).await?;
        next.text = format!("'{username}' approved!\n\n{}", next.text);
        Ok(vec![next])
    }

    async fn reject(&self, ctx: &WorkflowContext<'_>) -> anyhow::Result<Vec<ToUser>> {
        let Some(username) = self.current_username(ctx) else {
            return Ok(vec![self.show_current(ctx, &ctx.wf_state.data).await?]);
        };
        ctx.services.users.delete(&username).await?;
        self.delete_pending(ctx, &username).await?;

        let validator = ctx
            .services
            .sessions
            .get_session_state(ctx.session_id)
            .and_then(|s| s.username)
            .unwrap_or_else(|| "unknown".to_owned());
        tracing::info!(username = %username, validator = %validator,
            "user rejected, account deleted");

        let data = self.advanced(ctx);
        let mut next = self.show_current(ctx, &data).await?;
        next.text = format!("'{username}' rejected.\n\n{}", next.text);
        Ok(vec![next])
    }

    async fn delete_pending(
        &self,
        ctx: &WorkflowContext<'_>,
        username: &str,
    ) -> anyhow::Result<()> {
        let username = username.to_owned();
        ctx.services
            .db
            .call(move |conn| {
                conn.execute("DELETE FROM pending_validations WHERE username = ?1", [&username])?;
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
#[path = "validate_users_tests.rs"]
mod tests;
