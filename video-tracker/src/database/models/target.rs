//! Target database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::domain::TargetSettings;

/// One (channel, destination) subscription.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TargetDbModel {
    pub id: String,
    pub channel_id: String,
    /// Opaque destination handle understood by the messaging facade.
    pub destination: String,
    /// JSON blob, see [`TargetSettings`].
    pub settings: String,
    pub created_at: i64,
}

impl TargetDbModel {
    pub fn new(
        channel_id: impl Into<String>,
        destination: impl Into<String>,
        settings: &TargetSettings,
    ) -> crate::Result<Self> {
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            channel_id: channel_id.into(),
            destination: destination.into(),
            settings: settings.to_json()?,
            created_at: crate::database::time::now_ms(),
        })
    }

    /// Parsed settings. A corrupt blob falls back to defaults.
    pub fn settings(&self) -> TargetSettings {
        match TargetSettings::from_json(&self.settings) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(target_id = %self.id, error = %e, "Unreadable target settings, using defaults");
                TargetSettings::default()
            }
        }
    }
}
