//! Messaging facade boundary.
//!
//! The destination-side API (chat messages, channel names, scheduled events)
//! is provided by the embedding application. This module only defines the
//! calls the tracker makes and the failures it distinguishes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Destination-side failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The destination or message no longer exists.
    #[error("destination or message is gone")]
    Gone,
    /// The destination refuses the call; retrying will not help.
    #[error("permission denied")]
    PermissionDenied,
    #[error("delivery failed: {0}")]
    Other(String),
}

impl DeliveryError {
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

pub type DeliveryResult<T> = Result<T, DeliveryError>;

/// One labelled field of an embed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Rich message body. Rendering is up to the facade.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    pub author: Option<String>,
    pub author_url: Option<String>,
    pub author_icon: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub description: Option<String>,
    pub color: u32,
    pub thumbnail: Option<String>,
    pub image: Option<String>,
    pub footer: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub fields: Vec<EmbedField>,
}

/// A message as handed to the facade.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Plain text shown above the embed, typically the mention.
    pub content: Option<String>,
    pub embed: Embed,
}

/// Chat message CRUD plus the rename side effect.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Post a message and return its id.
    async fn create_message(
        &self,
        destination: &str,
        message: &OutboundMessage,
    ) -> DeliveryResult<String>;

    async fn edit_message(
        &self,
        destination: &str,
        message_id: &str,
        message: &OutboundMessage,
    ) -> DeliveryResult<()>;

    async fn delete_message(&self, destination: &str, message_id: &str) -> DeliveryResult<()>;

    /// Rename `destination` to reflect which tracked channels are live in it.
    /// An empty slice means none are.
    async fn rename_destination(
        &self,
        destination: &str,
        live_channels: &[String],
    ) -> DeliveryResult<()>;
}

/// Lifecycle status of a destination-native scheduled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalendarEventStatus {
    Scheduled,
    Active,
    Completed,
    Canceled,
}

/// Scheduled event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEventSpec {
    pub title: String,
    pub description: String,
    pub location: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Optional sub-facade for destination-native scheduled events.
#[async_trait]
pub trait EventCalendar: Send + Sync {
    /// Create an event and return its reference.
    async fn schedule_event(
        &self,
        destination: &str,
        event: &CalendarEventSpec,
    ) -> DeliveryResult<String>;

    async fn update_event(
        &self,
        destination: &str,
        event_ref: &str,
        event: &CalendarEventSpec,
        status: CalendarEventStatus,
    ) -> DeliveryResult<()>;

    async fn complete_event(&self, destination: &str, event_ref: &str) -> DeliveryResult<()>;
}
