// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Room creation: one step, inserts after the current room and moves the
//! session into the new room.

use async_trait::async_trait;

use crate::auth::permissions::PermissionLevel;
use crate::error::ErrorCode;
use crate::transport::packets::{HintKind, PacketHints, ToUser};
use crate::workflows::{Workflow, WorkflowContext, WorkflowKind};

const MIN_ROOM_NAME_LEN: usize = 3;

fn is_ascii_room_name(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == ' ')
}

pub struct CreateRoomWorkflow;

#[async_trait]
impl Workflow for CreateRoomWorkflow {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::CreateRoom
    }

    async fn start(&self, ctx: &WorkflowContext<'_>) -> anyhow::Result<Vec<ToUser>> {
        Ok(vec![ctx
            .reply("Preparing to create new room.\nPlease enter the room name:")
            .with_hints(PacketHints::workflow(self.kind().as_str(), 1, HintKind::Text))])
    }

    async fn handle(&self, ctx: &WorkflowContext<'_>, input: &str) -> anyhow::Result<Vec<ToUser>> {
        if ctx.wf_state.step != 1 {
            return Ok(ctx.invalid_step());
        }

        let room_name = input.trim();
        if !is_ascii_room_name(room_name) {
            return Ok(vec![ctx.error(
                ErrorCode::InvalidRoomName,
                "Room names are limited to ASCII characters only.",
            )]);
        }
        if room_name.len() < MIN_ROOM_NAME_LEN {
            return Ok(vec![ctx.error(
                ErrorCode::InvalidRoomName,
                "Room name must be at least 3 characters.",
            )]);
        }
        if ctx.services.rooms.get_id_by_name(room_name).await?.is_some() {
            return Ok(vec![ctx.error(
                ErrorCode::RoomNameTaken,
                format!("'{room_name}' already exists. Please try again."),
            )]);
        }

        let state = ctx.services.sessions.get_session_state(ctx.session_id);
        let after_room_id = match state.and_then(|s| s.current_room) {
            Some(id) => id,
            None => ctx.services.rooms.last_room_id().await?,
        };

        ctx.clear();

        // New rooms open at USER level, writable, with no description; the
        // edit flow adjusts the rest.
        let new_id = ctx
            .services
            .rooms
            .create_after(room_name, "", false, PermissionLevel::User, after_room_id)
            .await?;
        ctx.services.sessions.set_current_room(ctx.session_id, new_id);

        tracing::info!(room = %room_name, room_id = new_id, "room created");
        Ok(vec![ctx.reply(format!("Room {room_name} created!"))])
    }
}

#[cfg(test)]
#[path = "create_room_tests.rs"]
mod tests;
