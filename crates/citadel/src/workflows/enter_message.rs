// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message entry: optional recipient (Mail room), then body lines until a
//! solitary `.`.

use async_trait::async_trait;
use serde_json::Value;

use crate::db::system_rooms;
use crate::error::ErrorCode;
use crate::transport::packets::{HintKind, PacketHints, ToUser};
use crate::workflows::{data_str, Workflow, WorkflowContext, WorkflowKind};

const BODY_PROMPT: &str = "Enter your message. End with a single '.' on a line:";

pub struct EnterMessageWorkflow;

#[async_trait]
impl Workflow for EnterMessageWorkflow {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::EnterMessage
    }

    async fn start(&self, ctx: &WorkflowContext<'_>) -> anyhow::Result<Vec<ToUser>> {
        let state = ctx.services.sessions.get_session_state(ctx.session_id);
        let in_mail =
            state.and_then(|s| s.current_room) == Some(system_rooms::MAIL);
        if in_mail {
            ctx.advance(1, ctx.wf_state.data.clone());
            Ok(vec![ctx
                .reply("Enter recipient username:")
                .with_hints(PacketHints::workflow(self.kind().as_str(), 1, HintKind::Text))])
        } else {
            ctx.advance(2, ctx.wf_state.data.clone());
            Ok(vec![ctx
                .reply(BODY_PROMPT)
                .with_hints(PacketHints::workflow(self.kind().as_str(), 2, HintKind::Text))])
        }
    }

    async fn handle(&self, ctx: &WorkflowContext<'_>, input: &str) -> anyhow::Result<Vec<ToUser>> {
        match ctx.wf_state.step {
            1 => self.handle_recipient(ctx, input).await,
            2 => self.handle_body_line(ctx, input).await,
            _ => Ok(ctx.invalid_step()),
        }
    }
}

impl EnterMessageWorkflow {
    async fn handle_recipient(
        &self,
        ctx: &WorkflowContext<'_>,
        input: &str,
    ) -> anyhow::Result<Vec<ToUser>> {
        let recipient = input.trim();
        if recipient.is_empty() || !ctx.services.users.username_exists(recipient).await? {
            return Ok(vec![
                ctx.error(ErrorCode::InvalidRecipient, "Recipient not found. Try again.")
            ]);
        }
        let mut data = ctx.wf_state.data.clone();
        data.insert("recipient".to_owned(), recipient.into());
        ctx.advance(2, data);
        Ok(vec![ctx
            .reply(BODY_PROMPT)
            .with_hints(PacketHints::workflow(self.kind().as_str(), 2, HintKind::Text))])
    }

    async fn handle_body_line(
        &self,
        ctx: &WorkflowContext<'_>,
        input: &str,
    ) -> anyhow::Result<Vec<ToUser>> {
        let line = input.trim_end();
        let mut data = ctx.wf_state.data.clone();

        if line.trim() != "." {
            let lines = data
                .entry("lines".to_owned())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(lines) = lines {
                lines.push(line.into());
            }
            ctx.advance(2, data);
            // Body lines are collected silently.
            return Ok(Vec::new());
        }

        let content = match data.get("lines") {
            Some(Value::Array(lines)) => lines
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join("\n"),
            _ => String::new(),
        };
        if content.trim().is_empty() {
            ctx.clear();
            return Ok(vec![ctx.reply("Empty message discarded.")]);
        }

        let Some(state) = ctx.services.sessions.get_session_state(ctx.session_id) else {
            return Ok(vec![ctx.error(ErrorCode::InvalidSession, "Session expired or invalid.")]);
        };
        let username = state.username.clone().unwrap_or_default();
        let Some(user) = ctx.services.users.load(&username).await? else {
            return Ok(vec![ctx.error(ErrorCode::InvalidSession, "Session expired or invalid.")]);
        };
        let Some(room_id) = state.current_room else {
            return Ok(vec![ctx.error(ErrorCode::NoNextRoom, "You are not in a room.")]);
        };
        let Some(room) = ctx.services.rooms.load(room_id).await? else {
            return Ok(vec![ctx.error(ErrorCode::NoNextRoom, "Current room no longer exists.")]);
        };

        let recipient = if room.id == system_rooms::MAIL {
            data_str(&data, "recipient")
        } else {
            None
        };
        let msg_id =
            ctx.services.rooms.post_message(&room, &user, &content, recipient).await?;
        // Posting marks the author's own message as read.
        ctx.services.rooms.mark_seen(room.id, &user.username, msg_id).await?;

        ctx.clear();
        Ok(vec![ctx.reply(format!("Message {msg_id} posted in {}.", room.name))])
    }
}

#[cfg(test)]
#[path = "enter_message_tests.rs"]
mod tests;
