//! Destination-native scheduled event model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CalendarEventDbModel {
    pub id: String,
    pub target_id: String,
    pub video_id: String,
    pub destination: String,
    /// Reference returned by the facade.
    pub event_ref: String,
    pub start_time: i64,
    pub end_time: i64,
    pub title: String,
    /// Cleared once the facade reports the event gone; the row is then left alone.
    pub valid: bool,
}
