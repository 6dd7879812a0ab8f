//! Video lifecycle state.
//!
//! A video is in exactly one of four states, stored on the video row itself:
//!
//! | State      | Meaning                                         | Carries      |
//! |------------|-------------------------------------------------|--------------|
//! | `NEW`      | discovered, never resolved by the platform       | -            |
//! | `UPCOMING` | scheduled stream or premiere                     | [`Schedule`] |
//! | `LIVE`     | currently live                                   | [`LiveStats`]|
//! | `ENDED`    | resolved and no longer tracked                   | -            |
//!
//! Live and upcoming data can never coexist for the same video.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Overdue thresholds and the recheck interval used past each of them,
/// largest first.
const OVERDUE_RECHECK: [(Duration, Duration); 3] = [
    (Duration::hours(2), Duration::minutes(6)),
    (Duration::hours(1), Duration::minutes(4)),
    (Duration::minutes(20), Duration::minutes(2)),
];

/// State discriminant as stored in the `videos.state` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VideoStateKind {
    #[default]
    New,
    Upcoming,
    Live,
    Ended,
}

impl VideoStateKind {
    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Upcoming => "UPCOMING",
            Self::Live => "LIVE",
            Self::Ended => "ENDED",
        }
    }

    /// Parse from database string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NEW" => Some(Self::New),
            "UPCOMING" => Some(Self::Upcoming),
            "LIVE" => Some(Self::Live),
            "ENDED" => Some(Self::Ended),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, target: VideoStateKind) -> bool {
        use VideoStateKind::*;

        match (self, target) {
            // Attempt counter bump
            (New, New) => true,
            (New, Upcoming | Live | Ended) => true,

            // Reschedule
            (Upcoming, Upcoming) => true,
            (Upcoming, Live | Ended) => true,

            // Viewer stats refresh
            (Live, Live) => true,
            (Live, Ended) => true,

            _ => false,
        }
    }

    pub fn transition_to(&self, target: VideoStateKind) -> Result<VideoStateKind, Error> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(Error::InvalidStateTransition {
                from: self.as_str().to_string(),
                to: target.as_str().to_string(),
            })
        }
    }
}

impl std::fmt::Display for VideoStateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upcoming stream bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Platform-announced start time.
    pub start: DateTime<Utc>,
    /// The video is a candidate again once this passes.
    pub next_check: DateTime<Utc>,
    /// Number of successful polls since discovery.
    pub api_calls: i64,
}

impl Schedule {
    /// A freshly discovered schedule, due for recheck immediately.
    pub fn discovered(start: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            start,
            next_check: now,
            api_calls: 0,
        }
    }

    /// Record a "still upcoming" poll.
    pub fn reschedule(&mut self, start: DateTime<Utc>, now: DateTime<Utc>) {
        self.start = start;
        self.next_check = next_recheck(now, start);
        self.api_calls += 1;
    }

    /// Time remaining until the announced start; negative once overdue.
    pub fn until_start(&self, now: DateTime<Utc>) -> Duration {
        self.start - now
    }
}

/// Halving backoff towards `start`.
///
/// Before the start time the next check lands halfway between now and the
/// start. Past it, the stream is overdue and is polled on a fixed interval
/// that widens the longer it stays late.
pub fn next_recheck(now: DateTime<Utc>, start: DateTime<Utc>) -> DateTime<Utc> {
    let until = start - now;
    if until > Duration::zero() {
        return now + until / 2;
    }

    let overdue = -until;
    OVERDUE_RECHECK
        .iter()
        .find(|(threshold, _)| overdue > *threshold)
        .map_or(now, |(_, interval)| now + *interval)
}

/// Running statistics for a live stream, plus the snapshot used to
/// summarise it if the platform drops the video.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LiveStats {
    pub peak_viewers: i64,
    pub average_viewers: i64,
    /// Number of viewer samples folded into `average_viewers`.
    pub uptime_ticks: i64,
    pub thumbnail: Option<String>,
    pub channel_name: Option<String>,
    pub premiere: bool,
}

impl LiveStats {
    /// Stats for a stream that was just seen live for the first time.
    pub fn started(premiere: bool, thumbnail: Option<String>, channel_name: Option<String>) -> Self {
        Self {
            premiere,
            thumbnail,
            channel_name,
            ..Default::default()
        }
    }

    /// Fold one viewer sample into peak and running average.
    pub fn record_viewers(&mut self, current: i64) {
        self.uptime_ticks += 1;
        self.peak_viewers = self.peak_viewers.max(current);
        self.average_viewers =
            (self.average_viewers * (self.uptime_ticks - 1) + current) / self.uptime_ticks;
    }

    /// Refresh the cached snapshot, keeping old values where the new ones are missing.
    pub fn refresh_snapshot(&mut self, thumbnail: Option<&str>, channel_name: Option<&str>) {
        if let Some(thumbnail) = thumbnail {
            self.thumbnail = Some(thumbnail.to_string());
        }
        if let Some(name) = channel_name {
            self.channel_name = Some(name.to_string());
        }
    }
}

/// A video's state with the data that belongs to it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VideoState {
    #[default]
    New,
    Upcoming(Schedule),
    Live(LiveStats),
    Ended,
}

impl VideoState {
    pub fn kind(&self) -> VideoStateKind {
        match self {
            Self::New => VideoStateKind::New,
            Self::Upcoming(_) => VideoStateKind::Upcoming,
            Self::Live(_) => VideoStateKind::Live,
            Self::Ended => VideoStateKind::Ended,
        }
    }
}
