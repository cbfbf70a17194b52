// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Permission checks combining command minimums with room predicates.

use crate::auth::permissions::PermissionLevel;
use crate::db::system_rooms;
use crate::rooms::Room;
use crate::users::User;

/// How an action touches the current room, for room-scoped checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomAccess {
    /// Not room-scoped.
    None,
    Read,
    Post,
}

/// Whether `user` may perform an action requiring `min_level` with the given
/// room access in `room`.
pub fn is_allowed(
    min_level: PermissionLevel,
    access: RoomAccess,
    user: &User,
    room: Option<&Room>,
) -> bool {
    // The Twit room is open to twits (and staff) even though twits fail the
    // usual minimums, and closed to ordinary users.
    if let Some(room) = room {
        if room.id == system_rooms::TWIT && access != RoomAccess::None {
            return matches!(
                user.permission_level,
                PermissionLevel::Twit | PermissionLevel::Aide | PermissionLevel::Sysop
            );
        }
    }

    if user.permission_level < min_level {
        return false;
    }

    if let Some(room) = room {
        match access {
            RoomAccess::Read => {
                if !room.can_user_read(user) {
                    return false;
                }
            }
            RoomAccess::Post => {
                if !room.can_user_post(user) {
                    return false;
                }
            }
            RoomAccess::None => {}
        }
    }

    true
}

#[cfg(test)]
#[path = "checker_tests.rs"]
mod tests;
