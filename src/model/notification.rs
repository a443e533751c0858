use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Transient, fire-once notification payload. Delivery failures are logged,
/// never retried.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub id: Uuid,
    /// Target roster member.
    pub user_id: u64,
    pub title: String,
    pub message: String,
    pub category: String,
    pub action_url: Option<String>,
}

impl NotificationRequest {
    /// Attendance-category request, the only kind this engine emits.
    pub fn attendance(
        user_id: u64,
        title: impl Into<String>,
        message: impl Into<String>,
        action_url: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            title: title.into(),
            message: message.into(),
            category: "attendance".to_string(),
            action_url: Some(action_url.into()),
        }
    }
}
