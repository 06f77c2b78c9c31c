use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Public part of a user's profile, shown in the conversation header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub full_name: Option<String>,
}

impl Profile {
    pub const UNKNOWN_NAME: &'static str = "Unknown user";

    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(Self::UNKNOWN_NAME)
    }

    /// First letter of the name, if there is one
    pub fn avatar_initial(&self) -> Option<char> {
        self.full_name
            .as_deref()
            .and_then(|name| name.trim().chars().next())
            .map(|c| c.to_uppercase().next().unwrap_or(c))
    }
}
