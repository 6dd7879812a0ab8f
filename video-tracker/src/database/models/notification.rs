//! Delivered-notice bookkeeping models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A message posted for a (target, video) pair.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct NotificationDbModel {
    pub id: String,
    pub target_id: String,
    /// Internal video row id.
    pub video_id: String,
    pub destination: String,
    pub message_id: String,
    pub created_at: i64,
}

impl NotificationDbModel {
    pub fn new(
        target_id: impl Into<String>,
        video_id: impl Into<String>,
        destination: impl Into<String>,
        message_id: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            target_id: target_id.into(),
            video_id: video_id.into(),
            destination: destination.into(),
            message_id: message_id.into(),
            created_at: crate::database::time::now_ms(),
        }
    }
}

/// Marks that a target got the "upcoming" reminder for a video's current schedule.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UpcomingNoticeDbModel {
    pub video_id: String,
    pub target_id: String,
    pub message_id: String,
    pub created_at: i64,
}
