//! Tracker cadence, timeout and garbage-collection settings.
//!
//! The owning process builds one [`TrackerConfig`] and hands it to the
//! [`Ticker`](crate::tracker::Ticker). Values are plain integers so the record
//! can be deserialized from any config source; use the `Duration` accessors
//! at call sites.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{Error, Result};

/// Tracker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Minimum spacing between the start of two ticks.
    pub minimum_repeat_time_ms: u64,
    /// Cooldown after a tick before the single-flight lock is released.
    pub call_delay_ms: u64,
    /// How stale a live video's last poll must be before it is rechecked.
    pub live_recheck_secs: u64,
    /// Per-chunk share of the batch timeout.
    pub chunk_timeout_secs: u64,
    /// Pause between consecutive chunk calls.
    pub chunk_spacing_ms: u64,
    /// Upper bound on the candidate gather phase.
    pub gather_timeout_secs: u64,
    /// Preferred chunk size, further capped by the adapter's own limit.
    pub max_batch_size: usize,
    /// Number of videos handled concurrently within a tick.
    pub worker_concurrency: usize,
    /// Number of destination calls in flight per fan-out.
    pub delivery_concurrency: usize,
    /// Upper bound on handling a single video.
    pub item_timeout_secs: u64,
    /// Run garbage collection every N ticks (0 disables it).
    pub cleanup_every_ticks: u64,
    pub video_retention_days: u64,
    pub overdue_schedule_grace_hours: u64,
    /// NEW videos that failed to resolve more often than this are dropped.
    pub max_new_attempts: i64,
    /// Uploads published longer ago than this are not announced.
    pub upload_max_age_hours: u64,
    /// Live notices for streams older than this do not ping.
    pub stale_mention_minutes: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            minimum_repeat_time_ms: 30_000,
            call_delay_ms: 15_000,
            live_recheck_secs: 180,
            chunk_timeout_secs: 20,
            chunk_spacing_ms: 500,
            gather_timeout_secs: 12,
            max_batch_size: 20,
            worker_concurrency: 8,
            delivery_concurrency: 4,
            item_timeout_secs: 30,
            cleanup_every_ticks: 180,
            video_retention_days: 28,
            overdue_schedule_grace_hours: 24,
            max_new_attempts: 10,
            upload_max_age_hours: 3,
            stale_mention_minutes: 15,
        }
    }
}

impl TrackerConfig {
    pub fn minimum_repeat_time(&self) -> Duration {
        Duration::from_millis(self.minimum_repeat_time_ms)
    }

    pub fn call_delay(&self) -> Duration {
        Duration::from_millis(self.call_delay_ms)
    }

    pub fn live_recheck(&self) -> Duration {
        Duration::from_secs(self.live_recheck_secs)
    }

    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_secs(self.chunk_timeout_secs)
    }

    pub fn chunk_spacing(&self) -> Duration {
        Duration::from_millis(self.chunk_spacing_ms)
    }

    pub fn gather_timeout(&self) -> Duration {
        Duration::from_secs(self.gather_timeout_secs)
    }

    pub fn item_timeout(&self) -> Duration {
        Duration::from_secs(self.item_timeout_secs)
    }

    pub fn video_retention(&self) -> Duration {
        Duration::from_secs(self.video_retention_days * 24 * 60 * 60)
    }

    pub fn overdue_schedule_grace(&self) -> Duration {
        Duration::from_secs(self.overdue_schedule_grace_hours * 60 * 60)
    }

    pub fn upload_max_age(&self) -> Duration {
        Duration::from_secs(self.upload_max_age_hours * 60 * 60)
    }

    pub fn stale_mention(&self) -> Duration {
        Duration::from_secs(self.stale_mention_minutes * 60)
    }

    /// Load the configuration from `VIDEO_TRACKER_*` environment variables,
    /// falling back to defaults for anything unset.
    ///
    /// Supported env vars (all integers):
    /// - `VIDEO_TRACKER_MIN_REPEAT_MS`, `VIDEO_TRACKER_CALL_DELAY_MS`
    /// - `VIDEO_TRACKER_LIVE_RECHECK_SECS`
    /// - `VIDEO_TRACKER_CHUNK_TIMEOUT_SECS`, `VIDEO_TRACKER_CHUNK_SPACING_MS`
    /// - `VIDEO_TRACKER_GATHER_TIMEOUT_SECS`, `VIDEO_TRACKER_BATCH_SIZE`
    /// - `VIDEO_TRACKER_WORKERS`, `VIDEO_TRACKER_DELIVERY_CONCURRENCY`
    /// - `VIDEO_TRACKER_ITEM_TIMEOUT_SECS`, `VIDEO_TRACKER_CLEANUP_EVERY_TICKS`
    /// - `VIDEO_TRACKER_RETENTION_DAYS`, `VIDEO_TRACKER_OVERDUE_GRACE_HOURS`
    /// - `VIDEO_TRACKER_MAX_NEW_ATTEMPTS`, `VIDEO_TRACKER_UPLOAD_MAX_AGE_HOURS`
    /// - `VIDEO_TRACKER_STALE_MENTION_MINUTES`
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        read_env("VIDEO_TRACKER_MIN_REPEAT_MS", &mut config.minimum_repeat_time_ms)?;
        read_env("VIDEO_TRACKER_CALL_DELAY_MS", &mut config.call_delay_ms)?;
        read_env("VIDEO_TRACKER_LIVE_RECHECK_SECS", &mut config.live_recheck_secs)?;
        read_env("VIDEO_TRACKER_CHUNK_TIMEOUT_SECS", &mut config.chunk_timeout_secs)?;
        read_env("VIDEO_TRACKER_CHUNK_SPACING_MS", &mut config.chunk_spacing_ms)?;
        read_env("VIDEO_TRACKER_GATHER_TIMEOUT_SECS", &mut config.gather_timeout_secs)?;
        read_env("VIDEO_TRACKER_BATCH_SIZE", &mut config.max_batch_size)?;
        read_env("VIDEO_TRACKER_WORKERS", &mut config.worker_concurrency)?;
        read_env(
            "VIDEO_TRACKER_DELIVERY_CONCURRENCY",
            &mut config.delivery_concurrency,
        )?;
        read_env("VIDEO_TRACKER_ITEM_TIMEOUT_SECS", &mut config.item_timeout_secs)?;
        read_env(
            "VIDEO_TRACKER_CLEANUP_EVERY_TICKS",
            &mut config.cleanup_every_ticks,
        )?;
        read_env("VIDEO_TRACKER_RETENTION_DAYS", &mut config.video_retention_days)?;
        read_env(
            "VIDEO_TRACKER_OVERDUE_GRACE_HOURS",
            &mut config.overdue_schedule_grace_hours,
        )?;
        read_env("VIDEO_TRACKER_MAX_NEW_ATTEMPTS", &mut config.max_new_attempts)?;
        read_env(
            "VIDEO_TRACKER_UPLOAD_MAX_AGE_HOURS",
            &mut config.upload_max_age_hours,
        )?;
        read_env(
            "VIDEO_TRACKER_STALE_MENTION_MINUTES",
            &mut config.stale_mention_minutes,
        )?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall or spin the tracker.
    pub fn validate(&self) -> Result<()> {
        if self.minimum_repeat_time_ms == 0 {
            return Err(Error::config("minimum repeat time must be non-zero"));
        }
        if self.chunk_timeout_secs == 0 {
            return Err(Error::config("chunk timeout must be non-zero"));
        }
        if self.item_timeout_secs == 0 {
            return Err(Error::config("item timeout must be non-zero"));
        }
        if self.max_batch_size == 0 {
            return Err(Error::config("batch size must be at least 1"));
        }
        if self.worker_concurrency == 0 || self.delivery_concurrency == 0 {
            return Err(Error::config("concurrency limits must be at least 1"));
        }
        Ok(())
    }
}

fn read_env<T: std::str::FromStr>(key: &str, slot: &mut T) -> Result<()> {
    if let Ok(raw) = std::env::var(key)
        && !raw.trim().is_empty()
    {
        *slot = raw
            .trim()
            .parse()
            .map_err(|_| Error::config(format!("{key} has an invalid value: {raw}")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TrackerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.minimum_repeat_time(), Duration::from_secs(30));
        assert_eq!(config.call_delay(), Duration::from_secs(15));
        assert_eq!(config.video_retention(), Duration::from_secs(28 * 86_400));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let config = TrackerConfig {
            max_batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: TrackerConfig =
            serde_json::from_str(r#"{"call_delay_ms": 500, "worker_concurrency": 2}"#).unwrap();
        assert_eq!(config.call_delay_ms, 500);
        assert_eq!(config.worker_concurrency, 2);
        assert_eq!(config.chunk_timeout_secs, 20);
    }
}
