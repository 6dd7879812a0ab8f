//! Video database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::{datetime_to_ms, ms_to_datetime};
use crate::domain::{LiveStats, Schedule, VideoState, VideoStateKind};
use crate::{Error, Result};

/// One discovered video.
///
/// The state-specific columns are flattened onto the row; use
/// [`VideoDbModel::state`] for the typed view and
/// [`VideoStateColumns::from_state`] to write one back.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct VideoDbModel {
    pub id: String,
    /// Platform video id.
    pub video_id: String,
    pub channel_id: String,
    /// NEW, UPCOMING, LIVE or ENDED.
    pub state: String,
    pub last_title: Option<String>,
    /// Epoch ms of the last successful platform lookup.
    pub last_api_call: Option<i64>,
    /// Lookups that resolved without a usable schedule while NEW.
    pub api_attempts: i64,
    pub member_limited: bool,

    pub scheduled_start: Option<i64>,
    pub next_check: Option<i64>,
    pub api_calls: Option<i64>,

    pub peak_viewers: Option<i64>,
    pub average_viewers: Option<i64>,
    pub uptime_ticks: Option<i64>,
    pub last_thumbnail: Option<String>,
    pub last_channel_name: Option<String>,
    pub premiere: Option<bool>,

    pub created_at: i64,
}

impl VideoDbModel {
    pub fn new(video_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            video_id: video_id.into(),
            channel_id: channel_id.into(),
            state: VideoStateKind::New.as_str().to_string(),
            last_title: None,
            last_api_call: None,
            api_attempts: 0,
            member_limited: false,
            scheduled_start: None,
            next_check: None,
            api_calls: None,
            peak_viewers: None,
            average_viewers: None,
            uptime_ticks: None,
            last_thumbnail: None,
            last_channel_name: None,
            premiere: None,
            created_at: crate::database::time::now_ms(),
        }
    }

    pub fn kind(&self) -> Result<VideoStateKind> {
        VideoStateKind::parse(&self.state)
            .ok_or_else(|| Error::Database(format!("unknown video state '{}'", self.state)))
    }

    /// Rebuild the typed state from the row.
    pub fn state(&self) -> Result<VideoState> {
        let corrupt =
            |what: &str| Error::Database(format!("video {} is {} but lacks {}", self.id, self.state, what));

        Ok(match self.kind()? {
            VideoStateKind::New => VideoState::New,
            VideoStateKind::Ended => VideoState::Ended,
            VideoStateKind::Upcoming => VideoState::Upcoming(Schedule {
                start: ms_to_datetime(self.scheduled_start.ok_or_else(|| corrupt("scheduled_start"))?),
                next_check: ms_to_datetime(self.next_check.ok_or_else(|| corrupt("next_check"))?),
                api_calls: self.api_calls.unwrap_or(0),
            }),
            VideoStateKind::Live => VideoState::Live(LiveStats {
                peak_viewers: self.peak_viewers.ok_or_else(|| corrupt("peak_viewers"))?,
                average_viewers: self.average_viewers.ok_or_else(|| corrupt("average_viewers"))?,
                uptime_ticks: self.uptime_ticks.ok_or_else(|| corrupt("uptime_ticks"))?,
                thumbnail: self.last_thumbnail.clone(),
                channel_name: self.last_channel_name.clone(),
                premiere: self.premiere.unwrap_or(false),
            }),
        })
    }
}

/// Column values for one [`VideoState`]. Columns of inactive variants are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoStateColumns {
    pub state: &'static str,
    pub scheduled_start: Option<i64>,
    pub next_check: Option<i64>,
    pub api_calls: Option<i64>,
    pub peak_viewers: Option<i64>,
    pub average_viewers: Option<i64>,
    pub uptime_ticks: Option<i64>,
    pub last_thumbnail: Option<String>,
    pub last_channel_name: Option<String>,
    pub premiere: Option<bool>,
}

impl VideoStateColumns {
    pub fn from_state(state: &VideoState) -> Self {
        let mut columns = Self {
            state: state.kind().as_str(),
            ..Default::default()
        };
        match state {
            VideoState::New | VideoState::Ended => {}
            VideoState::Upcoming(schedule) => {
                columns.scheduled_start = Some(datetime_to_ms(schedule.start));
                columns.next_check = Some(datetime_to_ms(schedule.next_check));
                columns.api_calls = Some(schedule.api_calls);
            }
            VideoState::Live(stats) => {
                columns.peak_viewers = Some(stats.peak_viewers);
                columns.average_viewers = Some(stats.average_viewers);
                columns.uptime_ticks = Some(stats.uptime_ticks);
                columns.last_thumbnail = stats.thumbnail.clone();
                columns.last_channel_name = stats.channel_name.clone();
                columns.premiere = Some(stats.premiere);
            }
        }
        columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration};

    #[test]
    fn test_upcoming_columns_rebuild_state() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let state = VideoState::Upcoming(Schedule::discovered(now + Duration::hours(1), now));
        let columns = VideoStateColumns::from_state(&state);
        assert_eq!(columns.state, "UPCOMING");
        assert!(columns.peak_viewers.is_none());

        let mut row = VideoDbModel::new("abc", "chan");
        row.state = columns.state.to_string();
        row.scheduled_start = columns.scheduled_start;
        row.next_check = columns.next_check;
        row.api_calls = columns.api_calls;
        assert_eq!(row.state().unwrap(), state);
    }

    #[test]
    fn test_live_row_missing_stats_is_corrupt() {
        let mut row = VideoDbModel::new("abc", "chan");
        row.state = "LIVE".to_string();
        assert!(matches!(row.state(), Err(Error::Database(_))));
    }
}
