//! Channel database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A tracked platform account.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ChannelDbModel {
    pub id: String,
    /// Account id on the platform.
    pub platform_id: String,
    /// Last display name reported by the platform.
    pub display_name: Option<String>,
    /// Ticks in a row whose lookups for this channel's videos failed transiently.
    pub consecutive_error_count: i64,
    pub last_error: Option<String>,
    pub created_at: i64,
}

impl ChannelDbModel {
    pub fn new(platform_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            platform_id: platform_id.into(),
            display_name: None,
            consecutive_error_count: 0,
            last_error: None,
            created_at: crate::database::time::now_ms(),
        }
    }
}
