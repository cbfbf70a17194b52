// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Total order of user permission levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    Unverified,
    Twit,
    User,
    Aide,
    Sysop,
}

impl PermissionLevel {
    pub const ALL: [Self; 5] =
        [Self::Unverified, Self::Twit, Self::User, Self::Aide, Self::Sysop];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unverified => "unverified",
            Self::Twit => "twit",
            Self::User => "user",
            Self::Aide => "aide",
            Self::Sysop => "sysop",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unverified" => Some(Self::Unverified),
            "twit" => Some(Self::Twit),
            "user" => Some(Self::User),
            "aide" => Some(Self::Aide),
            "sysop" => Some(Self::Sysop),
            _ => None,
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "permissions_tests.rs"]
mod tests;
