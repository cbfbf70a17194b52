// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The built-in command set: the descriptor table and its handlers.

use crate::auth::checker::{is_allowed, RoomAccess};
use crate::auth::permissions::PermissionLevel;
use crate::commands::parser::ParsedCommand;
use crate::commands::processor::CommandProcessor;
use crate::commands::{CommandCategory, CommandName, CommandSpec};
use crate::db::system_rooms;
use crate::error::ErrorCode;
use crate::rooms::Room;
use crate::session::SessionSnapshot;
use crate::transport::meshcore::node_auth::NodeAuth;
use crate::transport::packets::ToUser;
use crate::users::User;
use crate::workflows::WorkflowKind;

/// Every command code the parser recognizes.
pub fn command_table() -> Vec<CommandSpec> {
    use CommandCategory as Cat;
    use CommandName as Name;
    use PermissionLevel as Perm;
    use RoomAccess as Access;

    vec![
        CommandSpec {
            code: "G",
            name: Name::GoNextUnread,
            category: Cat::Common,
            permission_level: Perm::User,
            room_access: Access::None,
            short_text: "Goto next unread room",
            help_text: "Go to the next room with unread messages. This skips over rooms \
                        you've already read completely.",
            arg_help: "",
            implemented: true,
        },
        CommandSpec {
            code: "E",
            name: Name::EnterMessage,
            category: Cat::Common,
            permission_level: Perm::User,
            room_access: Access::Post,
            short_text: "Enter message",
            help_text: "Compose and post a message to the current room.",
            arg_help: "",
            implemented: true,
        },
        CommandSpec {
            code: "R",
            name: Name::ReadMessages,
            category: Cat::Common,
            permission_level: Perm::User,
            room_access: Access::Read,
            short_text: "Read messages",
            help_text: "Read the next unread message in the current room, or a specific \
                        message by ID.",
            arg_help: "[message_id]",
            implemented: true,
        },
        CommandSpec {
            code: "N",
            name: Name::ReadNewMessages,
            category: Cat::Common,
            permission_level: Perm::User,
            room_access: Access::Read,
            short_text: "Read new messages",
            help_text: "Read all new messages since your last visit, oldest first.",
            arg_help: "",
            implemented: true,
        },
        CommandSpec {
            code: "K",
            name: Name::KnownRooms,
            category: Cat::Common,
            permission_level: Perm::User,
            room_access: Access::None,
            short_text: "Known rooms",
            help_text: "List all rooms known to you.",
            arg_help: "",
            implemented: true,
        },
        CommandSpec {
            code: "I",
            name: Name::IgnoreRoom,
            category: Cat::Common,
            permission_level: Perm::User,
            room_access: Access::Read,
            short_text: "Ignore room",
            help_text: "Ignore or unignore the current room.",
            arg_help: "",
            implemented: false,
        },
        CommandSpec {
            code: "Q",
            name: Name::Quit,
            category: Cat::Common,
            permission_level: Perm::Unverified,
            room_access: Access::None,
            short_text: "Quit",
            help_text: "Quit or log off.",
            arg_help: "",
            implemented: true,
        },
        CommandSpec {
            code: "cancel",
            name: Name::Cancel,
            category: Cat::Common,
            permission_level: Perm::Unverified,
            room_access: Access::None,
            short_text: "Cancel workflow",
            help_text: "Cancel the current workflow and return to normal command mode.",
            arg_help: "",
            implemented: true,
        },
        CommandSpec {
            code: "S",
            name: Name::ScanMessages,
            category: Cat::Uncommon,
            permission_level: Perm::User,
            room_access: Access::Read,
            short_text: "Scan messages",
            help_text: "Show message summaries in the current room.",
            arg_help: "",
            implemented: true,
        },
        CommandSpec {
            code: "C",
            name: Name::ChangeRoom,
            category: Cat::Uncommon,
            permission_level: Perm::User,
            room_access: Access::None,
            short_text: "Change room",
            help_text: "Change to a room by name or number.",
            arg_help: "{room}",
            implemented: true,
        },
        CommandSpec {
            code: "H",
            name: Name::Help,
            category: Cat::Common,
            permission_level: Perm::Unverified,
            room_access: Access::None,
            short_text: "Help",
            help_text: "Display a help menu of available commands.",
            arg_help: "[command]",
            implemented: true,
        },
        CommandSpec {
            code: "?",
            name: Name::Help,
            category: Cat::Common,
            permission_level: Perm::Unverified,
            room_access: Access::None,
            short_text: "Help",
            help_text: "Display a help menu of available commands.",
            arg_help: "[command]",
            implemented: true,
        },
        CommandSpec {
            code: "M",
            name: Name::Mail,
            category: Cat::Uncommon,
            permission_level: Perm::User,
            room_access: Access::None,
            short_text: "Go to Mail",
            help_text: "Go directly to the Mail room to send or receive private messages.",
            arg_help: "",
            implemented: true,
        },
        CommandSpec {
            code: "W",
            name: Name::Who,
            category: Cat::Uncommon,
            permission_level: Perm::User,
            room_access: Access::None,
            short_text: "Who's online",
            help_text: "List active users currently online.",
            arg_help: "",
            implemented: true,
        },
        CommandSpec {
            code: "D",
            name: Name::DeleteMessage,
            category: Cat::Common,
            permission_level: Perm::User,
            room_access: Access::None,
            short_text: "Delete message",
            help_text: "Delete a message by ID. Only Aides and Sysops can delete others' \
                        messages.",
            arg_help: "{message_id}",
            implemented: true,
        },
        CommandSpec {
            code: "B",
            name: Name::BlockUser,
            category: Cat::Unusual,
            permission_level: Perm::User,
            room_access: Access::None,
            short_text: "(Un)Block user",
            help_text: "Block or unblock another user. Prevents you seeing their messages \
                        (they can still see yours).",
            arg_help: "{target_user}",
            implemented: true,
        },
        CommandSpec {
            code: "V",
            name: Name::ValidateUsers,
            category: Cat::Aide,
            permission_level: Perm::Aide,
            room_access: Access::None,
            short_text: "Validate users",
            help_text: "Enter the user validation workflow to approve new users.",
            arg_help: "",
            implemented: true,
        },
        CommandSpec {
            code: ".C",
            name: Name::CreateRoom,
            category: Cat::Unusual,
            permission_level: Perm::User,
            room_access: Access::None,
            short_text: "Create room",
            help_text: "Create a new room through an interactive workflow.",
            arg_help: "{name}",
            implemented: true,
        },
        CommandSpec {
            code: ".ER",
            name: Name::EditRoom,
            category: Cat::Sysop,
            permission_level: Perm::Sysop,
            room_access: Access::None,
            short_text: "Edit room",
            help_text: "Edit a room's characteristics.",
            arg_help: "{room} {attributes}",
            implemented: false,
        },
        CommandSpec {
            code: ".EU",
            name: Name::EditUser,
            category: Cat::Sysop,
            permission_level: Perm::Sysop,
            room_access: Access::None,
            short_text: "Edit user",
            help_text: "Edit a user's characteristics.",
            arg_help: "{target_user}",
            implemented: true,
        },
        CommandSpec {
            code: ".FF",
            name: Name::FastForward,
            category: Cat::Unusual,
            permission_level: Perm::User,
            room_access: Access::None,
            short_text: "Fast-forward",
            help_text: "Skip to the latest message in the current room, resetting your \
                        last-read pointer.",
            arg_help: "",
            implemented: true,
        },
    ]
}

/// Dispatch an implemented, permitted command.
pub(crate) async fn run(
    proc: &CommandProcessor,
    session_id: &str,
    cmd: &ParsedCommand,
    snapshot: &SessionSnapshot,
    user: &User,
    room: Option<&Room>,
) -> anyhow::Result<Vec<ToUser>> {
    match cmd.name {
        CommandName::GoNextUnread => go_next_unread(proc, session_id, user, room).await,
        CommandName::EnterMessage => {
            proc.workflows
                .start_workflow(&proc.services, session_id, WorkflowKind::EnterMessage)
                .await
        }
        CommandName::ReadMessages => read_messages(proc, session_id, cmd, user, room).await,
        CommandName::ReadNewMessages => read_new_messages(proc, session_id, user, room).await,
        CommandName::KnownRooms => known_rooms(proc, session_id, user).await,
        CommandName::Quit => quit(proc, session_id, snapshot, user).await,
        CommandName::Cancel => {
            // With no workflow attached there is nothing to cancel; the
            // attached case is handled before dispatch.
            Ok(vec![ToUser::error(
                session_id,
                ErrorCode::NoWorkflow,
                "No active workflow to cancel.",
            )])
        }
        CommandName::ScanMessages => scan_messages(proc, session_id, user, room).await,
        CommandName::ChangeRoom => change_room(proc, session_id, cmd, user).await,
        CommandName::Help => help(proc, session_id, cmd, user, room).await,
        CommandName::Mail => mail(proc, session_id, user).await,
        CommandName::Who => who(proc, session_id),
        CommandName::DeleteMessage => delete_message(proc, session_id, cmd, user).await,
        CommandName::BlockUser => block_user(proc, session_id, cmd, user).await,
        CommandName::ValidateUsers => {
            proc.workflows
                .start_workflow(&proc.services, session_id, WorkflowKind::ValidateUsers)
                .await
        }
        CommandName::CreateRoom => {
            proc.workflows
                .start_workflow(&proc.services, session_id, WorkflowKind::CreateRoom)
                .await
        }
        CommandName::EditUser => {
            proc.workflows
                .start_workflow(&proc.services, session_id, WorkflowKind::EditUser)
                .await
        }
        CommandName::FastForward => fast_forward(proc, session_id, user, room).await,
        CommandName::IgnoreRoom | CommandName::EditRoom => {
            // Declared but unimplemented; the processor filters these out.
            Ok(vec![ToUser::error(
                session_id,
                ErrorCode::UnknownCommand,
                format!("Command {} is not implemented.", cmd.code),
            )])
        }
    }
}

async fn go_next_unread(
    proc: &CommandProcessor,
    session_id: &str,
    user: &User,
    room: Option<&Room>,
) -> anyhow::Result<Vec<ToUser>> {
    let rooms = &proc.services.rooms;
    let from = match room {
        Some(room) => room.clone(),
        None => match rooms.load(system_rooms::LOBBY).await? {
            Some(lobby) => lobby,
            None => anyhow::bail!("lobby missing"),
        },
    };

    if let Some(next) = rooms.go_to_next_room(&from, user, true).await? {
        proc.services.sessions.set_current_room(session_id, next.id);
        return Ok(vec![ToUser::new(
            session_id,
            format!("You are now in room '{}'.", next.name),
        )]);
    }

    // Nothing unread ahead; wrap back to the Lobby.
    proc.services.sessions.set_current_room(session_id, system_rooms::LOBBY);
    Ok(vec![ToUser::new(
        session_id,
        "You are now in room 'Lobby'. No rooms with unread messages found.",
    )])
}

async fn read_messages(
    proc: &CommandProcessor,
    session_id: &str,
    cmd: &ParsedCommand,
    user: &User,
    room: Option<&Room>,
) -> anyhow::Result<Vec<ToUser>> {
    let Some(room) = room else {
        return Ok(vec![ToUser::new(session_id, "You are not in a room.")]);
    };

    if !cmd.args.is_empty() {
        let Ok(msg_id) = cmd.args.trim().parse::<i64>() else {
            return Ok(vec![ToUser::error(
                session_id,
                ErrorCode::InvalidCommand,
                "Message ID must be a number.",
            )]);
        };
        let Some(record) = proc.services.messages.get(msg_id, Some(user)).await? else {
            return Ok(vec![ToUser::error(
                session_id,
                ErrorCode::InvalidCommand,
                format!("Message {msg_id} not found."),
            )]);
        };
        let view = proc
            .services
            .messages
            .view(&proc.services.users, record, &room.name, Some(user))
            .await?;
        return Ok(vec![ToUser::new(session_id, "").with_message(view)]);
    }

    // Next unread: advance the pointer past anything this user may not
    // see (other people's private mail).
    for msg_id in proc.services.rooms.unread_message_ids(room.id, &user.username).await? {
        proc.services.rooms.mark_seen(room.id, &user.username, msg_id).await?;
        let Some(record) = proc.services.messages.get(msg_id, Some(user)).await? else {
            continue;
        };
        let view = proc
            .services
            .messages
            .view(&proc.services.users, record, &room.name, Some(user))
            .await?;
        return Ok(vec![ToUser::new(session_id, "").with_message(view)]);
    }
    Ok(vec![ToUser::new(session_id, "No unread messages.")])
}

async fn read_new_messages(
    proc: &CommandProcessor,
    session_id: &str,
    user: &User,
    room: Option<&Room>,
) -> anyhow::Result<Vec<ToUser>> {
    let Some(room) = room else {
        return Ok(vec![ToUser::new(session_id, "You are not in a room.")]);
    };
    let ids = proc.services.rooms.unread_message_ids(room.id, &user.username).await?;
    if ids.is_empty() {
        return Ok(vec![ToUser::new(session_id, "No unread messages.")]);
    }

    let mut replies = Vec::new();
    for record in proc.services.messages.get_many(&ids).await? {
        // Other people's private mail stays invisible.
        if let Some(ref recipient) = record.recipient {
            if record.sender != user.username && *recipient != user.username {
                continue;
            }
        }
        let view = proc
            .services
            .messages
            .view(&proc.services.users, record, &room.name, Some(user))
            .await?;
        replies.push(ToUser::new(session_id, "").with_message(view));
    }
    proc.services.rooms.skip_to_latest(room.id, &user.username).await?;
    if replies.is_empty() {
        return Ok(vec![ToUser::new(session_id, "No unread messages.")]);
    }
    Ok(replies)
}

async fn known_rooms(
    proc: &CommandProcessor,
    session_id: &str,
    user: &User,
) -> anyhow::Result<Vec<ToUser>> {
    let rooms = proc.services.rooms.known_rooms(user).await?;
    let mut lines = vec!["Rooms:".to_owned()];
    for room in rooms {
        let marker = if proc.services.rooms.has_unread_messages(room.id, &user.username).await? {
            "*"
        } else {
            " "
        };
        lines.push(format!("{marker} {} ({})", room.name, room.id));
    }
    Ok(vec![ToUser::new(session_id, lines.join("\n"))])
}

async fn quit(
    proc: &CommandProcessor,
    session_id: &str,
    snapshot: &SessionSnapshot,
    user: &User,
) -> anyhow::Result<Vec<ToUser>> {
    // Voluntary logout also forgets the node's password cache; involuntary
    // expiry keeps it so the user can auto-relogin.
    if let Some(ref node_id) = snapshot.node_id {
        let node_auth = NodeAuth::new(
            proc.services.db.clone(),
            std::sync::Arc::clone(&proc.services.config),
        );
        node_auth.clear(node_id).await?;
    }
    proc.services.sessions.expire_session(session_id);
    tracing::info!(username = %user.username, "user logged out via quit");
    Ok(vec![ToUser::new(session_id, "Goodbye!")])
}

async fn scan_messages(
    proc: &CommandProcessor,
    session_id: &str,
    user: &User,
    room: Option<&Room>,
) -> anyhow::Result<Vec<ToUser>> {
    let Some(room) = room else {
        return Ok(vec![ToUser::new(session_id, "You are not in a room.")]);
    };
    let ids = proc.services.rooms.message_ids(room.id).await?;
    let mut lines = Vec::new();
    for id in ids {
        // Summaries respect private-message visibility.
        if proc.services.messages.get(id, Some(user)).await?.is_none() {
            continue;
        }
        if let Some(summary) = proc.services.messages.summary(id).await? {
            lines.push(summary);
        }
    }
    if lines.is_empty() {
        return Ok(vec![ToUser::new(session_id, "No messages in this room.")]);
    }
    Ok(vec![ToUser::new(session_id, lines.join("\n"))])
}

async fn change_room(
    proc: &CommandProcessor,
    session_id: &str,
    cmd: &ParsedCommand,
    user: &User,
) -> anyhow::Result<Vec<ToUser>> {
    let target = cmd.args.trim();
    if target.is_empty() {
        return Ok(vec![ToUser::error(
            session_id,
            ErrorCode::InvalidCommand,
            "Specify a room name or number.",
        )]);
    }
    let Some(room) = proc.services.rooms.resolve(target).await? else {
        return Ok(vec![ToUser::error(
            session_id,
            ErrorCode::NoNextRoom,
            format!("Room {target} not found."),
        )]);
    };
    if !room.can_user_read(user) {
        return Ok(vec![ToUser::error(
            session_id,
            ErrorCode::PermissionDenied,
            format!("You do not have permission to enter {}.", room.name),
        )]);
    }
    proc.services.sessions.set_current_room(session_id, room.id);
    Ok(vec![ToUser::new(session_id, format!("You are now in room '{}'.", room.name))])
}

async fn help(
    proc: &CommandProcessor,
    session_id: &str,
    cmd: &ParsedCommand,
    user: &User,
    room: Option<&Room>,
) -> anyhow::Result<Vec<ToUser>> {
    let topic = cmd.args.trim();
    if !topic.is_empty() {
        return command_help(proc, session_id, topic, user, room);
    }

    // Compact menu of implemented, permitted commands, grouped by category.
    let mut sections = Vec::new();
    for category in [
        CommandCategory::Common,
        CommandCategory::Uncommon,
        CommandCategory::Unusual,
        CommandCategory::Aide,
        CommandCategory::Sysop,
    ] {
        let mut entries: Vec<&CommandSpec> = proc
            .registry
            .iter()
            .filter(|spec| {
                spec.category == category
                    && spec.implemented
                    && spec.code != "?"
                    && is_allowed(spec.permission_level, spec.room_access, user, room)
            })
            .collect();
        if entries.is_empty() {
            continue;
        }
        entries.sort_by_key(|spec| spec.code);
        let line = entries
            .iter()
            .map(|spec| format!("{}-{}", spec.code, spec.short_text))
            .collect::<Vec<_>>()
            .join("  ");
        sections.push(format!("{} Commands:\n{line}", category.title()));
    }
    Ok(vec![ToUser::new(session_id, sections.join("\n"))])
}

fn command_help(
    proc: &CommandProcessor,
    session_id: &str,
    topic: &str,
    user: &User,
    room: Option<&Room>,
) -> anyhow::Result<Vec<ToUser>> {
    let Some(spec) = proc.registry.get(topic) else {
        return Ok(vec![ToUser::error(
            session_id,
            ErrorCode::UnknownCommand,
            format!("Unknown command: {topic}"),
        )]);
    };
    if !is_allowed(spec.permission_level, spec.room_access, user, room) {
        return Ok(vec![ToUser::error(
            session_id,
            ErrorCode::PermissionDenied,
            format!("You don't have permission to use command {}", spec.code),
        )]);
    }
    if !spec.implemented {
        return Ok(vec![ToUser::new(
            session_id,
            format!("{} - {}\n(Not yet implemented)", spec.code, spec.short_text),
        )]);
    }
    let mut text = format!("{} - {}\n{}", spec.code, spec.short_text, spec.help_text);
    if !spec.arg_help.is_empty() {
        text.push_str(&format!("\n\nUsage: {} {}", spec.code, spec.arg_help));
    }
    Ok(vec![ToUser::new(session_id, text)])
}

async fn mail(
    proc: &CommandProcessor,
    session_id: &str,
    user: &User,
) -> anyhow::Result<Vec<ToUser>> {
    let Some(mail_room) = proc.services.rooms.load(system_rooms::MAIL).await? else {
        anyhow::bail!("mail room missing");
    };
    proc.services.sessions.set_current_room(session_id, mail_room.id);
    let unread =
        if proc.services.rooms.has_unread_messages(mail_room.id, &user.username).await? {
            " You have unread mail."
        } else {
            ""
        };
    Ok(vec![ToUser::new(session_id, format!("You are now in room 'Mail'.{unread}"))])
}

fn who(proc: &CommandProcessor, session_id: &str) -> anyhow::Result<Vec<ToUser>> {
    let names = proc.services.sessions.active_usernames();
    let text = if names.is_empty() {
        "No users online.".to_owned()
    } else {
        format!("Online: {}", names.join(", "))
    };
    Ok(vec![ToUser::new(session_id, text)])
}

async fn delete_message(
    proc: &CommandProcessor,
    session_id: &str,
    cmd: &ParsedCommand,
    user: &User,
) -> anyhow::Result<Vec<ToUser>> {
    let Ok(msg_id) = cmd.args.trim().parse::<i64>() else {
        return Ok(vec![ToUser::error(
            session_id,
            ErrorCode::InvalidCommand,
            "Specify a message ID to delete.",
        )]);
    };
    let Some(record) = proc.services.messages.get(msg_id, None).await? else {
        return Ok(vec![ToUser::error(
            session_id,
            ErrorCode::InvalidCommand,
            format!("Message {msg_id} not found."),
        )]);
    };
    if record.sender != user.username && user.permission_level < PermissionLevel::Aide {
        return Ok(vec![ToUser::error(
            session_id,
            ErrorCode::PermissionDenied,
            "Only Aides and Sysops can delete others' messages.",
        )]);
    }
    proc.services.messages.delete(msg_id).await?;
    tracing::info!(message_id = msg_id, username = %user.username, "message deleted");
    Ok(vec![ToUser::new(session_id, format!("Message {msg_id} deleted."))])
}

async fn block_user(
    proc: &CommandProcessor,
    session_id: &str,
    cmd: &ParsedCommand,
    user: &User,
) -> anyhow::Result<Vec<ToUser>> {
    let target = cmd.args.trim();
    if target.is_empty() {
        return Ok(vec![ToUser::error(
            session_id,
            ErrorCode::InvalidCommand,
            "Specify a username to block or unblock.",
        )]);
    }
    if target.eq_ignore_ascii_case(&user.username) {
        return Ok(vec![ToUser::error(
            session_id,
            ErrorCode::InvalidCommand,
            "You cannot block yourself.",
        )]);
    }
    let Some(actual) = proc.services.users.actual_username(target).await? else {
        return Ok(vec![ToUser::error(
            session_id,
            ErrorCode::InvalidUsername,
            format!("User '{target}' not found."),
        )]);
    };

    if proc.services.users.is_blocked(&user.username, &actual).await? {
        proc.services.users.unblock(&user.username, &actual).await?;
        Ok(vec![ToUser::new(session_id, format!("No longer blocking {actual}."))])
    } else {
        proc.services.users.block(&user.username, &actual).await?;
        Ok(vec![ToUser::new(session_id, format!("Now blocking {actual}."))])
    }
}

async fn fast_forward(
    proc: &CommandProcessor,
    session_id: &str,
    user: &User,
    room: Option<&Room>,
) -> anyhow::Result<Vec<ToUser>> {
    let Some(room) = room else {
        return Ok(vec![ToUser::new(session_id, "You are not in a room.")]);
    };
    proc.services.rooms.skip_to_latest(room.id, &user.username).await?;
    Ok(vec![ToUser::new(
        session_id,
        format!("Fast-forwarded to the latest message in {}.", room.name),
    )])
}

#[cfg(test)]
#[path = "builtins_tests.rs"]
mod tests;
