// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn levels_form_a_total_order() {
    assert!(PermissionLevel::Unverified < PermissionLevel::Twit);
    assert!(PermissionLevel::Twit < PermissionLevel::User);
    assert!(PermissionLevel::User < PermissionLevel::Aide);
    assert!(PermissionLevel::Aide < PermissionLevel::Sysop);
}

#[test]
fn parse_round_trips() {
    for level in PermissionLevel::ALL {
        assert_eq!(PermissionLevel::parse(level.as_str()), Some(level));
    }
    assert_eq!(PermissionLevel::parse("root"), None);
}
