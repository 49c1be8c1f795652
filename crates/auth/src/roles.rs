//! RBAC roles.

use serde::{Deserialize, Serialize};

/// Role granted to a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Admin,
    Editor,
    Consumer,
    Publisher,
}

impl UserRole {
    pub const ALL: [UserRole; 5] = [
        UserRole::User,
        UserRole::Admin,
        UserRole::Editor,
        UserRole::Consumer,
        UserRole::Publisher,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
            UserRole::Editor => "editor",
            UserRole::Consumer => "consumer",
            UserRole::Publisher => "publisher",
        }
    }

    /// Parse a stored role string; unknown values yield `None` so stale
    /// database entries do not take the whole record down.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(UserRole::User),
            "admin" => Some(UserRole::Admin),
            "editor" => Some(UserRole::Editor),
            "consumer" => Some(UserRole::Consumer),
            "publisher" => Some(UserRole::Publisher),
            _ => None,
        }
    }
}

impl core::fmt::Display for UserRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
