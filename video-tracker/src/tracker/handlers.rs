//! Per-video state transitions.
//!
//! Each lookup result is applied inside its own `BEGIN IMMEDIATE`
//! transaction: the freshness columns are written first, then the state
//! change. Notices go out only after the commit, so a destination outage
//! never holds a database lock.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::Result;
use crate::database::models::VideoDbModel;
use crate::database::repositories::{ChannelTxOps, VideoTxOps};
use crate::database::time::datetime_to_ms;
use crate::database::{DbPool, ImmediateTransaction, begin_immediate};
use crate::domain::{LiveStats, Schedule, VideoState};
use crate::notifier::{DeliveryReport, Notifier};
use crate::platform::{FetchError, FetchResult, VideoInfo};

/// What a lookup did to a video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Transient failure; nothing was written.
    IoFailed {
        channel_id: Option<String>,
        message: String,
    },
    /// Resolved without a state change.
    Unchanged,
    /// NEW video the platform does not know.
    Deleted,
    /// NEW upcoming video without a start time yet.
    Unresolved,
    /// NEW to UPCOMING.
    Scheduled,
    /// UPCOMING rechecked and still upcoming.
    Rescheduled,
    /// UPCOMING that vanished or resolved without going live.
    ScheduleDropped,
    /// NEW or UPCOMING to LIVE.
    WentLive,
    /// LIVE reconfirmed.
    StillLive,
    /// LIVE to ENDED.
    StreamEnded,
    /// NEW plain video, announced once and no longer tracked.
    Uploaded,
}

/// Result of handling one video.
#[derive(Debug, Clone)]
pub struct HandleOutcome {
    pub transition: Transition,
    pub delivery: DeliveryReport,
}

impl From<Transition> for HandleOutcome {
    fn from(transition: Transition) -> Self {
        Self {
            transition,
            delivery: DeliveryReport::default(),
        }
    }
}

/// Applies lookup results to stored videos.
pub struct TransitionHandler {
    pool: DbPool,
    notifier: Arc<Notifier>,
}

impl TransitionHandler {
    pub fn new(pool: DbPool, notifier: Arc<Notifier>) -> Self {
        Self { pool, notifier }
    }

    /// Apply one lookup result for platform video `video_id`.
    pub async fn handle(
        &self,
        video_id: &str,
        result: FetchResult,
        now: DateTime<Utc>,
    ) -> Result<HandleOutcome> {
        let info = match result {
            Err(FetchError::Io(message)) => return self.io_failed(video_id, message).await,
            Err(FetchError::NotFound) => None,
            Ok(info) => Some(info),
        };

        let mut tx = begin_immediate(&self.pool).await?;
        let Some(video) = VideoTxOps::get_by_video_id(&mut tx, video_id).await? else {
            debug!(video = video_id, "Video removed while its lookup was in flight");
            tx.rollback().await?;
            return Ok(Transition::Unchanged.into());
        };
        let state = video.state()?;

        if let Some(info) = &info {
            VideoTxOps::touch(
                &mut tx,
                &video.id,
                datetime_to_ms(now),
                &info.title,
                info.member_limited,
            )
            .await?;
            let name = Some(info.channel.name.as_str()).filter(|n| !n.is_empty());
            ChannelTxOps::record_success(&mut tx, &video.channel_id, name).await?;
        }

        match (state, info) {
            (VideoState::New, info) => self.from_new(tx, video, info, now).await,
            (VideoState::Upcoming(schedule), info) => {
                self.from_upcoming(tx, video, schedule, info, now).await
            }
            (VideoState::Live(stats), info) => self.from_live(tx, video, stats, info, now).await,
            (VideoState::Ended, _) => {
                tx.commit().await?;
                Ok(Transition::Unchanged.into())
            }
        }
    }

    async fn io_failed(&self, video_id: &str, message: String) -> Result<HandleOutcome> {
        debug!(video = video_id, error = %message, "Lookup failed, retrying next tick");
        let channel_id: Option<(String,)> =
            sqlx::query_as("SELECT channel_id FROM videos WHERE video_id = ?")
                .bind(video_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(Transition::IoFailed {
            channel_id: channel_id.map(|r| r.0),
            message,
        }
        .into())
    }

    async fn from_new(
        &self,
        mut tx: ImmediateTransaction,
        video: VideoDbModel,
        info: Option<VideoInfo>,
        now: DateTime<Utc>,
    ) -> Result<HandleOutcome> {
        let Some(info) = info else {
            VideoTxOps::delete(&mut tx, &video.id).await?;
            tx.commit().await?;
            info!(video = %video.video_id, "Video not found on platform, removed");
            return Ok(Transition::Deleted.into());
        };

        if info.live {
            return self.go_live(tx, video, info, now).await;
        }

        if info.upcoming {
            let Some(start) = info.scheduled_start() else {
                VideoTxOps::bump_api_attempts(&mut tx, &video.id).await?;
                tx.commit().await?;
                debug!(video = %video.video_id, "Upcoming video has no start time yet");
                return Ok(Transition::Unresolved.into());
            };
            let schedule = Schedule::discovered(start, now);
            VideoTxOps::transition(&mut tx, &video, &VideoState::Upcoming(schedule)).await?;
            tx.commit().await?;
            info!(video = %video.video_id, %start, "New upcoming stream");

            let delivery = self
                .notify("creation", self.notifier.stream_created(&video, &info, start, now))
                .await;
            return Ok(HandleOutcome {
                transition: Transition::Scheduled,
                delivery,
            });
        }

        VideoTxOps::transition(&mut tx, &video, &VideoState::Ended).await?;
        tx.commit().await?;
        debug!(video = %video.video_id, "Resolved as a regular video");
        let delivery = self
            .notify("upload", self.notifier.video_uploaded(&video, &info, now))
            .await;
        Ok(HandleOutcome {
            transition: Transition::Uploaded,
            delivery,
        })
    }

    async fn from_upcoming(
        &self,
        mut tx: ImmediateTransaction,
        video: VideoDbModel,
        mut schedule: Schedule,
        info: Option<VideoInfo>,
        now: DateTime<Utc>,
    ) -> Result<HandleOutcome> {
        let Some(info) = info.filter(|i| i.live || i.upcoming) else {
            VideoTxOps::transition(&mut tx, &video, &VideoState::Ended).await?;
            VideoTxOps::clear_upcoming_notices(&mut tx, &video.id).await?;
            tx.commit().await?;
            info!(video = %video.video_id, "Scheduled stream gone or never went live");
            return Ok(Transition::ScheduleDropped.into());
        };

        if info.live {
            VideoTxOps::clear_upcoming_notices(&mut tx, &video.id).await?;
            return self.go_live(tx, video, info, now).await;
        }

        let Some(start) = info.scheduled_start() else {
            tx.commit().await?;
            warn!(video = %video.video_id, "Upcoming stream lost its start time");
            return Ok(Transition::Unchanged.into());
        };
        schedule.reschedule(start, now);
        VideoTxOps::transition(&mut tx, &video, &VideoState::Upcoming(schedule.clone())).await?;
        tx.commit().await?;
        debug!(video = %video.video_id, next_check = %schedule.next_check, "Still upcoming");

        let delivery = self
            .notify(
                "upcoming",
                self.notifier.stream_upcoming(&video, &info, &schedule, now),
            )
            .await;
        Ok(HandleOutcome {
            transition: Transition::Rescheduled,
            delivery,
        })
    }

    async fn from_live(
        &self,
        mut tx: ImmediateTransaction,
        video: VideoDbModel,
        mut stats: LiveStats,
        info: Option<VideoInfo>,
        now: DateTime<Utc>,
    ) -> Result<HandleOutcome> {
        match info {
            Some(info) if info.live => {
                if let Some(viewers) = info.concurrent_viewers() {
                    stats.record_viewers(viewers);
                }
                let name = Some(info.channel.name.as_str()).filter(|n| !n.is_empty());
                stats.refresh_snapshot(info.thumbnail.as_deref(), name);
                VideoTxOps::transition(&mut tx, &video, &VideoState::Live(stats)).await?;
                tx.commit().await?;

                let delivery = self
                    .notify("live backfill", self.notifier.backfill_live(&video, &info, now))
                    .await;
                Ok(HandleOutcome {
                    transition: Transition::StillLive,
                    delivery,
                })
            }
            info => {
                VideoTxOps::transition(&mut tx, &video, &VideoState::Ended).await?;
                tx.commit().await?;
                info!(
                    video = %video.video_id,
                    vod = info.is_some(),
                    peak = stats.peak_viewers,
                    average = stats.average_viewers,
                    "Stream ended"
                );

                let delivery = self
                    .notify(
                        "stream end",
                        self.notifier.stream_end(&video, &stats, info.as_ref(), now),
                    )
                    .await;
                Ok(HandleOutcome {
                    transition: Transition::StreamEnded,
                    delivery,
                })
            }
        }
    }

    async fn go_live(
        &self,
        mut tx: ImmediateTransaction,
        video: VideoDbModel,
        info: VideoInfo,
        now: DateTime<Utc>,
    ) -> Result<HandleOutcome> {
        let name = Some(info.channel.name.clone()).filter(|n| !n.is_empty());
        let mut stats = LiveStats::started(info.premiere, info.thumbnail.clone(), name);
        if let Some(viewers) = info.concurrent_viewers() {
            stats.record_viewers(viewers);
        }
        VideoTxOps::transition(&mut tx, &video, &VideoState::Live(stats)).await?;
        tx.commit().await?;
        info!(video = %video.video_id, premiere = info.premiere, "Stream went live");

        let delivery = self
            .notify("go-live", self.notifier.stream_start(&video, &info, now))
            .await;
        Ok(HandleOutcome {
            transition: Transition::WentLive,
            delivery,
        })
    }

    /// Await a notifier call made after the state change was committed.
    /// Its failure is counted, not propagated.
    async fn notify(
        &self,
        what: &'static str,
        call: impl Future<Output = Result<DeliveryReport>>,
    ) -> DeliveryReport {
        match call.await {
            Ok(report) => report,
            Err(e) => {
                warn!(notice = what, error = %e, "Notifier failed");
                DeliveryReport {
                    failed: 1,
                    ..Default::default()
                }
            }
        }
    }
}
