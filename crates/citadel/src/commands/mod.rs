// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command descriptors and the build-time registry.

pub mod builtins;
pub mod parser;
pub mod processor;

use std::collections::HashMap;

use crate::auth::checker::RoomAccess;
use crate::auth::permissions::PermissionLevel;

/// Help-menu grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandCategory {
    Common,
    Uncommon,
    Unusual,
    Aide,
    Sysop,
}

impl CommandCategory {
    pub fn title(&self) -> &'static str {
        match self {
            Self::Common => "Common",
            Self::Uncommon => "Uncommon",
            Self::Unusual => "Unusual",
            Self::Aide => "Aide",
            Self::Sysop => "Sysop",
        }
    }
}

/// Dispatch key for implemented commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandName {
    GoNextUnread,
    EnterMessage,
    ReadMessages,
    ReadNewMessages,
    KnownRooms,
    IgnoreRoom,
    Quit,
    Cancel,
    ScanMessages,
    ChangeRoom,
    Help,
    Mail,
    Who,
    DeleteMessage,
    BlockUser,
    ValidateUsers,
    CreateRoom,
    EditRoom,
    EditUser,
    FastForward,
}

impl CommandName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GoNextUnread => "go_next_unread",
            Self::EnterMessage => "enter_message",
            Self::ReadMessages => "read_messages",
            Self::ReadNewMessages => "read_new_messages",
            Self::KnownRooms => "known_rooms",
            Self::IgnoreRoom => "ignore_room",
            Self::Quit => "quit",
            Self::Cancel => "cancel",
            Self::ScanMessages => "scan_messages",
            Self::ChangeRoom => "change_room",
            Self::Help => "help",
            Self::Mail => "mail",
            Self::Who => "who",
            Self::DeleteMessage => "delete_message",
            Self::BlockUser => "block_user",
            Self::ValidateUsers => "validate_users",
            Self::CreateRoom => "create_room",
            Self::EditRoom => "edit_room",
            Self::EditUser => "edit_user",
            Self::FastForward => "fast_forward",
        }
    }
}

/// Static descriptor for one command code.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub code: &'static str,
    pub name: CommandName,
    pub category: CommandCategory,
    pub permission_level: PermissionLevel,
    pub room_access: RoomAccess,
    pub short_text: &'static str,
    pub help_text: &'static str,
    /// Argument summary for detailed help, e.g. `"{room}"`.
    pub arg_help: &'static str,
    /// Declared commands without an implementation show up in help as
    /// not-yet-implemented and refuse to run.
    pub implemented: bool,
}

/// Registry of all command codes, built once at startup and passed by
/// reference; there is no global table.
pub struct CommandRegistry {
    specs: Vec<CommandSpec>,
    by_code: HashMap<String, usize>,
}

impl CommandRegistry {
    pub fn builtin() -> Self {
        Self::from_specs(builtins::command_table())
    }

    pub fn from_specs(specs: Vec<CommandSpec>) -> Self {
        let by_code = specs
            .iter()
            .enumerate()
            .map(|(i, spec)| (spec.code.to_ascii_uppercase(), i))
            .collect();
        Self { specs, by_code }
    }

    /// Case-insensitive lookup by command code.
    pub fn get(&self, code: &str) -> Option<&CommandSpec> {
        let idx = *self.by_code.get(&code.to_ascii_uppercase())?;
        self.specs.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandSpec> {
        self.specs.iter()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
