use serde::{Deserialize, Serialize};

/// Roster member. Owned by the identity/profile system; this engine treats it
/// as read-only reference data.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Employee {
    pub id: u64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub department: Option<String>,
    pub position: Option<String>,
    pub role: String,
    pub is_active: bool,
    pub avatar_url: Option<String>,
}

impl Employee {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}
