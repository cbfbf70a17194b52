// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Post-pipeline prompt decorator. Handlers never emit prompt strings;
//! the transport appends one to the final packet of each response.

use crate::auth::permissions::PermissionLevel;
use crate::db::system_rooms;
use crate::state::Services;
use crate::transport::packets::ToUser;

pub const BARE_PROMPT: &str = "What now? (H for help)";

/// Append the standard prompt (and any notifications) to `packet`.
/// Sessions inside a workflow get no prompt; the workflow's own question
/// is the prompt.
pub async fn insert_prompt(services: &Services, session_id: &str, packet: &mut ToUser) {
    if services.sessions.get_workflow(session_id).is_some() {
        return;
    }
    let prompt = match build_prompt(services, session_id).await {
        Ok(prompt) => prompt,
        Err(e) => {
            tracing::warn!(session_id = %session_id, err = %e, "prompt build failed");
            BARE_PROMPT.to_owned()
        }
    };
    match packet.message {
        Some(ref mut view) => {
            view.content.push('\n');
            view.content.push_str(&prompt);
        }
        None => {
            if !packet.text.is_empty() {
                packet.text.push('\n');
            }
            packet.text.push_str(&prompt);
        }
    }
}

async fn build_prompt(services: &Services, session_id: &str) -> anyhow::Result<String> {
    let snapshot = services.sessions.get_session_state(session_id);
    let (username, room_id) = match snapshot {
        Some(s) => (s.username, s.current_room),
        None => (None, None),
    };
    let (Some(username), Some(room_id)) = (username, room_id) else {
        return Ok(BARE_PROMPT.to_owned());
    };

    let mut lines = Vec::new();
    let user = services.users.load(&username).await?;

    if let Some(ref user) = user {
        if user.permission_level >= PermissionLevel::Aide {
            let count: i64 = services
                .db
                .call(|conn| {
                    Ok(conn.query_row(
                        "SELECT COUNT(*) FROM pending_validations",
                        [],
                        |row| row.get(0),
                    )?)
                })
                .await?;
            if count == 1 {
                lines.push("* There is 1 validation to review".to_owned());
            } else if count > 1 {
                lines.push(format!("* There are {count} validations to review"));
            }
        }
    }

    if services.rooms.has_unread_messages(system_rooms::MAIL, &username).await? {
        lines.push("* You have unread mail".to_owned());
    }

    let room_name = match services.rooms.load(room_id).await? {
        Some(room) => room.name,
        None => format!("Room {room_id}"),
    };
    lines.push(format!("In {room_name}. {BARE_PROMPT}"));
    Ok(lines.join("\n"))
}

#[cfg(test)]
#[path = "prompt_tests.rs"]
mod tests;
