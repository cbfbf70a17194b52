// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::users::UserStatus;

fn user(level: PermissionLevel) -> User {
    User {
        username: "u".to_owned(),
        display_name: "u".to_owned(),
        permission_level: level,
        status: UserStatus::Active,
        last_login: None,
    }
}

fn room(id: i64, level: PermissionLevel, read_only: bool) -> Room {
    Room {
        id,
        name: format!("room-{id}"),
        description: String::new(),
        read_only,
        permission_level: level,
        next_neighbor: None,
        prev_neighbor: None,
    }
}

#[test]
fn allowed_implies_min_level_met() {
    // Outside the Twit room, success implies the user meets the minimum.
    let rooms = [
        None,
        Some(room(system_rooms::LOBBY, PermissionLevel::User, false)),
        Some(room(system_rooms::MIN_USER_ROOM_ID, PermissionLevel::Aide, false)),
    ];
    for user_level in PermissionLevel::ALL {
        for min in PermissionLevel::ALL {
            for access in [RoomAccess::None, RoomAccess::Read, RoomAccess::Post] {
                for r in &rooms {
                    if is_allowed(min, access, &user(user_level), r.as_ref()) {
                        assert!(user_level >= min);
                    }
                }
            }
        }
    }
}

#[test]
fn twit_room_exception_is_symmetric() {
    let twit_room = room(system_rooms::TWIT, PermissionLevel::Twit, false);
    for access in [RoomAccess::Read, RoomAccess::Post] {
        // Twits and staff get in regardless of the action's minimum.
        for level in [PermissionLevel::Twit, PermissionLevel::Aide, PermissionLevel::Sysop] {
            assert!(is_allowed(PermissionLevel::User, access, &user(level), Some(&twit_room)));
        }
        // Ordinary users and unverified accounts stay out.
        for level in [PermissionLevel::Unverified, PermissionLevel::User] {
            assert!(!is_allowed(
                PermissionLevel::User,
                access,
                &user(level),
                Some(&twit_room)
            ));
        }
    }
}

#[test]
fn room_predicates_gate_room_scoped_actions() {
    let aide_room = room(10, PermissionLevel::Aide, false);
    let plain = user(PermissionLevel::User);
    assert!(!is_allowed(PermissionLevel::User, RoomAccess::Read, &plain, Some(&aide_room)));
    // Non-room-scoped actions ignore room predicates.
    assert!(is_allowed(PermissionLevel::User, RoomAccess::None, &plain, Some(&aide_room)));

    let ro_room = room(11, PermissionLevel::User, true);
    assert!(is_allowed(PermissionLevel::User, RoomAccess::Read, &plain, Some(&ro_room)));
    assert!(!is_allowed(PermissionLevel::User, RoomAccess::Post, &plain, Some(&ro_room)));
}
