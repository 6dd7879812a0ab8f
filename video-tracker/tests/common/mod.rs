//! Shared fixtures: a file-backed SQLite store, a scripted platform and a
//! messenger that records every call.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tempfile::TempDir;

use video_tracker::TrackerConfig;
use video_tracker::database::models::{TargetDbModel, VideoDbModel};
use video_tracker::database::repositories::{
    ChannelRepository, SqlxChannelRepository, SqlxTargetRepository, SqlxVideoRepository,
    TargetRepository, VideoRepository, VideoTxOps,
};
use video_tracker::database::{DbPool, begin_immediate, init_pool, run_migrations};
use video_tracker::domain::{TargetSettings, VideoState};
use video_tracker::messaging::{
    CalendarEventSpec, CalendarEventStatus, DeliveryError, DeliveryResult, EventCalendar, Messenger,
    OutboundMessage,
};
use video_tracker::notifier::{Notifier, NotifierConfig};
use video_tracker::platform::{ChannelInfo, FetchError, FetchResult, LiveInfo, VideoInfo, VideoSource};
use video_tracker::tracker::VideoTracker;

pub const CHANNEL: &str = "UC_alice";

pub async fn setup_db() -> (TempDir, DbPool) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let url = format!("sqlite:{}?mode=rwc", dir.path().join("tracker.db").display());
    let pool = init_pool(&url).await.expect("Failed to create test pool");
    run_migrations(&pool).await.expect("Failed to run migrations");
    (dir, pool)
}

/// Settings with every delay and timeout shrunk for tests.
pub fn fast_config() -> TrackerConfig {
    TrackerConfig {
        minimum_repeat_time_ms: 50,
        call_delay_ms: 0,
        chunk_spacing_ms: 0,
        chunk_timeout_secs: 5,
        item_timeout_secs: 5,
        cleanup_every_ticks: 0,
        ..Default::default()
    }
}

pub fn ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).expect("valid timestamp")
}

pub async fn seed_channel(pool: &DbPool) -> String {
    SqlxChannelRepository::new(pool.clone())
        .get_or_create_channel(CHANNEL)
        .await
        .expect("create channel")
        .id
}

pub async fn seed_target(pool: &DbPool, channel_id: &str, destination: &str, settings: TargetSettings) -> TargetDbModel {
    let target = TargetDbModel::new(channel_id, destination, &settings).expect("serialize settings");
    SqlxTargetRepository::new(pool.clone())
        .create_target(&target)
        .await
        .expect("create target");
    target
}

pub async fn seed_video(pool: &DbPool, channel_id: &str, video_id: &str, state: VideoState) -> VideoDbModel {
    let video = SqlxVideoRepository::new(pool.clone())
        .get_or_create_video(video_id, channel_id)
        .await
        .expect("create video");
    if state != VideoState::New {
        let mut tx = begin_immediate(pool).await.expect("begin");
        VideoTxOps::set_state(&mut tx, &video.id, &state).await.expect("set state");
        tx.commit().await.expect("commit");
    }
    load_video(pool, video_id).await.expect("video exists")
}

pub async fn load_video(pool: &DbPool, video_id: &str) -> Option<VideoDbModel> {
    SqlxVideoRepository::new(pool.clone())
        .get_video_by_video_id(video_id)
        .await
        .expect("query video")
}

pub async fn count(pool: &DbPool, table: &str) -> i64 {
    let row: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .expect("count rows");
    row.0
}

fn channel_info() -> ChannelInfo {
    ChannelInfo {
        id: CHANNEL.to_string(),
        name: "Alice".to_string(),
        url: Some(format!("https://example.com/channel/{CHANNEL}")),
        avatar: None,
    }
}

pub fn plain_video(id: &str) -> VideoInfo {
    VideoInfo {
        id: id.to_string(),
        title: format!("Video {id}"),
        url: format!("https://example.com/watch/{id}"),
        thumbnail: Some(format!("https://img.example.com/{id}.jpg")),
        channel: channel_info(),
        ..Default::default()
    }
}

pub fn upcoming_video(id: &str, start: DateTime<Utc>) -> VideoInfo {
    VideoInfo {
        upcoming: true,
        live_info: Some(LiveInfo {
            scheduled_start: Some(start),
            ..Default::default()
        }),
        ..plain_video(id)
    }
}

pub fn live_video(id: &str, started: DateTime<Utc>, viewers: i64) -> VideoInfo {
    VideoInfo {
        live: true,
        live_info: Some(LiveInfo {
            scheduled_start: Some(started),
            start_time: Some(started),
            concurrent_viewers: Some(viewers),
            ..Default::default()
        }),
        ..plain_video(id)
    }
}

/// Platform stand-in returning scripted results.
///
/// Ids without a script are left out of the response and therefore come
/// back as not found.
#[derive(Default)]
pub struct FakeSource {
    results: Mutex<HashMap<String, FetchResult>>,
    calls: Mutex<Vec<Vec<String>>>,
    delay: Option<Duration>,
    batch_limit: usize,
}

impl FakeSource {
    pub fn new() -> Self {
        Self {
            batch_limit: 50,
            ..Default::default()
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    pub fn set(&self, id: &str, result: FetchResult) {
        self.results.lock().insert(id.to_string(), result);
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl VideoSource for FakeSource {
    fn platform(&self) -> &'static str {
        "fake"
    }

    fn batch_limit(&self) -> usize {
        self.batch_limit
    }

    async fn get_videos(&self, ids: &[String]) -> Result<HashMap<String, FetchResult>, FetchError> {
        self.calls.lock().push(ids.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let results = self.results.lock();
        Ok(ids
            .iter()
            .filter_map(|id| results.get(id).map(|r| (id.clone(), r.clone())))
            .collect())
    }
}

/// One call made to the messenger.
#[derive(Debug, Clone)]
pub enum Sent {
    Create {
        destination: String,
        message_id: String,
        message: OutboundMessage,
    },
    Edit {
        destination: String,
        message_id: String,
        message: OutboundMessage,
    },
    Delete {
        destination: String,
        message_id: String,
    },
    Rename {
        destination: String,
        live: Vec<String>,
    },
}

/// Messenger that records calls and fails on request per destination.
#[derive(Default)]
pub struct RecordingMessenger {
    log: Mutex<Vec<Sent>>,
    failures: Mutex<HashMap<String, DeliveryError>>,
    panics: Mutex<Vec<String>>,
    next_id: AtomicUsize,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call to `destination` fail with `error`.
    pub fn fail(&self, destination: &str, error: DeliveryError) {
        self.failures.lock().insert(destination.to_string(), error);
    }

    /// Make message creation in `destination` panic.
    pub fn panic_on(&self, destination: &str) {
        self.panics.lock().push(destination.to_string());
    }

    pub fn recover(&self, destination: &str) {
        self.failures.lock().remove(destination);
    }

    pub fn log(&self) -> Vec<Sent> {
        self.log.lock().clone()
    }

    pub fn created(&self) -> Vec<(String, OutboundMessage)> {
        self.log()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Create {
                    destination,
                    message,
                    ..
                } => Some((destination, message)),
                _ => None,
            })
            .collect()
    }

    pub fn created_in(&self, destination: &str) -> usize {
        self.created().iter().filter(|(d, _)| d == destination).count()
    }

    pub fn edits(&self) -> Vec<(String, String, OutboundMessage)> {
        self.log()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Edit {
                    destination,
                    message_id,
                    message,
                } => Some((destination, message_id, message)),
                _ => None,
            })
            .collect()
    }

    pub fn renames(&self) -> Vec<(String, Vec<String>)> {
        self.log()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Rename { destination, live } => Some((destination, live)),
                _ => None,
            })
            .collect()
    }

    fn check(&self, destination: &str) -> DeliveryResult<()> {
        match self.failures.lock().get(destination) {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn create_message(&self, destination: &str, message: &OutboundMessage) -> DeliveryResult<String> {
        let panics = self.panics.lock().iter().any(|d| d == destination);
        if panics {
            panic!("messenger crashed sending to {destination}");
        }
        self.check(destination)?;
        let message_id = format!("msg-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.log.lock().push(Sent::Create {
            destination: destination.to_string(),
            message_id: message_id.clone(),
            message: message.clone(),
        });
        Ok(message_id)
    }

    async fn edit_message(&self, destination: &str, message_id: &str, message: &OutboundMessage) -> DeliveryResult<()> {
        self.log.lock().push(Sent::Edit {
            destination: destination.to_string(),
            message_id: message_id.to_string(),
            message: message.clone(),
        });
        self.check(destination)
    }

    async fn delete_message(&self, destination: &str, message_id: &str) -> DeliveryResult<()> {
        self.log.lock().push(Sent::Delete {
            destination: destination.to_string(),
            message_id: message_id.to_string(),
        });
        self.check(destination)
    }

    async fn rename_destination(&self, destination: &str, live_channels: &[String]) -> DeliveryResult<()> {
        self.log.lock().push(Sent::Rename {
            destination: destination.to_string(),
            live: live_channels.to_vec(),
        });
        Ok(())
    }
}

/// Calls made to the scheduled-event facade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarCall {
    Schedule {
        destination: String,
        event: CalendarEventSpec,
    },
    Update {
        event_ref: String,
        status: CalendarEventStatus,
    },
    Complete {
        event_ref: String,
    },
}

/// Scheduled-event facade that records calls, optionally refusing creation.
#[derive(Default)]
pub struct RecordingCalendar {
    calls: Mutex<Vec<CalendarCall>>,
    refuse: Option<DeliveryError>,
}

impl RecordingCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refusing(error: DeliveryError) -> Self {
        Self {
            refuse: Some(error),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<CalendarCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl EventCalendar for RecordingCalendar {
    async fn schedule_event(&self, destination: &str, event: &CalendarEventSpec) -> DeliveryResult<String> {
        if let Some(e) = &self.refuse {
            return Err(e.clone());
        }
        let mut calls = self.calls.lock();
        calls.push(CalendarCall::Schedule {
            destination: destination.to_string(),
            event: event.clone(),
        });
        Ok(format!("event-{}", calls.len()))
    }

    async fn update_event(
        &self,
        _destination: &str,
        event_ref: &str,
        _event: &CalendarEventSpec,
        status: CalendarEventStatus,
    ) -> DeliveryResult<()> {
        self.calls.lock().push(CalendarCall::Update {
            event_ref: event_ref.to_string(),
            status,
        });
        Ok(())
    }

    async fn complete_event(&self, _destination: &str, event_ref: &str) -> DeliveryResult<()> {
        self.calls.lock().push(CalendarCall::Complete {
            event_ref: event_ref.to_string(),
        });
        Ok(())
    }
}

pub fn notifier(pool: &DbPool, messenger: &Arc<RecordingMessenger>) -> Arc<Notifier> {
    Arc::new(Notifier::from_pool(
        pool,
        messenger.clone(),
        NotifierConfig::from(&fast_config()),
    ))
}

pub fn tracker(
    pool: &DbPool,
    source: &Arc<FakeSource>,
    messenger: &Arc<RecordingMessenger>,
    config: TrackerConfig,
) -> VideoTracker {
    VideoTracker::new(pool.clone(), source.clone(), notifier(pool, messenger), config)
}
