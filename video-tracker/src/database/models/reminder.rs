//! One-shot reminder model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// "Tell me when this video goes live", consumed on first live detection.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct VideoReminderDbModel {
    pub id: String,
    pub video_id: String,
    pub destination: String,
    /// Mention to put in front of the notice.
    pub mention: Option<String>,
    pub created_at: i64,
}

impl VideoReminderDbModel {
    pub fn new(
        video_id: impl Into<String>,
        destination: impl Into<String>,
        mention: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            video_id: video_id.into(),
            destination: destination.into(),
            mention,
            created_at: crate::database::time::now_ms(),
        }
    }
}
