//! Metadata adapter boundary.
//!
//! A platform integration turns raw API responses into [`VideoInfo`] records
//! and reports per-id failures. HTTP transport, auth and quota handling live
//! behind [`VideoSource`] and are not part of this crate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-id lookup failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// Transient failure; the id is retried on a later tick.
    #[error("platform request failed: {0}")]
    Io(String),
    /// The platform reports the video as permanently unavailable.
    #[error("video not found")]
    NotFound,
}

impl FetchError {
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }
}

/// Result for one requested id.
pub type FetchResult = Result<VideoInfo, FetchError>;

/// Snapshot of the owning channel as reported alongside a video.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
    pub url: Option<String>,
    pub avatar: Option<String>,
}

/// Live streaming details. Present for streams and premieres, including
/// finished ones (the VOD).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveInfo {
    pub scheduled_start: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub concurrent_viewers: Option<i64>,
}

/// Uniform video record produced by a platform adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub id: String,
    pub title: String,
    pub description: String,
    pub thumbnail: Option<String>,
    pub url: String,
    /// Length in seconds; absent while live or upcoming.
    pub duration_secs: Option<i64>,
    pub published: Option<DateTime<Utc>>,
    pub live: bool,
    pub upcoming: bool,
    pub premiere: bool,
    pub member_limited: bool,
    pub short: bool,
    pub live_info: Option<LiveInfo>,
    pub channel: ChannelInfo,
}

impl VideoInfo {
    pub fn scheduled_start(&self) -> Option<DateTime<Utc>> {
        self.live_info.as_ref().and_then(|l| l.scheduled_start)
    }

    pub fn concurrent_viewers(&self) -> Option<i64> {
        self.live_info.as_ref().and_then(|l| l.concurrent_viewers)
    }

    /// Actual stream start, falling back to the scheduled start.
    pub fn live_since(&self) -> Option<DateTime<Utc>> {
        self.live_info
            .as_ref()
            .and_then(|l| l.start_time.or(l.scheduled_start))
    }

    /// A finished stream or premiere that is now a regular video.
    pub fn is_vod(&self) -> bool {
        !self.live && !self.upcoming && self.live_info.is_some()
    }
}

/// Batched metadata lookup.
#[async_trait]
pub trait VideoSource: Send + Sync {
    /// Short platform name used in logs.
    fn platform(&self) -> &'static str;

    /// Maximum number of ids accepted per call.
    fn batch_limit(&self) -> usize;

    /// Look up `ids`.
    ///
    /// An `Err` fails the whole call and is applied to every id. Ids
    /// missing from an `Ok` map are treated as [`FetchError::NotFound`].
    async fn get_videos(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, FetchResult>, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vod_detection() {
        let mut info = VideoInfo {
            live_info: Some(LiveInfo::default()),
            ..Default::default()
        };
        assert!(info.is_vod());
        info.live = true;
        assert!(!info.is_vod());
        info.live = false;
        info.live_info = None;
        assert!(!info.is_vod());
    }

    #[test]
    fn test_live_since_prefers_actual_start() {
        let scheduled = DateTime::from_timestamp(1_000, 0);
        let actual = DateTime::from_timestamp(2_000, 0);
        let info = VideoInfo {
            live_info: Some(LiveInfo {
                scheduled_start: scheduled,
                start_time: actual,
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(info.live_since(), actual);
    }
}
