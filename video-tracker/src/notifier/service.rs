//! Notifier service.
//!
//! Decides per target whether a notice fires, builds it, hands it to the
//! [`Messenger`], and records what was delivered so a later tick does not
//! repeat it. Destination calls for one event are fanned out with a bounded
//! concurrency; a failure for one target never affects the others.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use super::content::{self, EndedSnapshot, LiveNoticeStyle};
use super::events::CalendarManager;
use super::mention::{MentionContext, resolve_mention};
use crate::config::TrackerConfig;
use crate::database::DbPool;
use crate::database::models::{NotificationDbModel, TargetDbModel, VideoDbModel};
use crate::database::repositories::{
    CalendarEventRepository, NotificationRepository, ReminderRepository,
    SqlxCalendarEventRepository, SqlxNotificationRepository, SqlxReminderRepository,
    SqlxTargetRepository, TargetRepository,
};
use crate::domain::{LiveStats, NoticeKind, Schedule, TargetSettings};
use crate::messaging::{DeliveryError, EventCalendar, Messenger};
use crate::platform::VideoInfo;
use crate::{Error, Result};

/// Notifier settings.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Destination calls in flight per fan-out.
    pub delivery_concurrency: usize,
    /// Live notices for streams older than this do not ping.
    pub stale_mention: Duration,
    /// Uploads older than this are not announced.
    pub upload_max_age: Duration,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self::from(&TrackerConfig::default())
    }
}

impl From<&TrackerConfig> for NotifierConfig {
    fn from(config: &TrackerConfig) -> Self {
        Self {
            delivery_concurrency: config.delivery_concurrency,
            stale_mention: config.stale_mention(),
            upload_max_age: config.upload_max_age(),
        }
    }
}

/// Result of one destination interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    Edited,
    Deleted,
    /// Not eligible, already delivered, or nothing left to do.
    Skipped,
    Failed,
    /// The destination refused or vanished and the target was dropped.
    TargetRemoved,
}

/// Delivery counters for one fan-out, merged into the tick report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub sent: u32,
    pub edited: u32,
    pub deleted: u32,
    pub skipped: u32,
    pub failed: u32,
    pub targets_removed: u32,
}

impl DeliveryReport {
    pub fn record(&mut self, outcome: DeliveryOutcome) {
        let counter = match outcome {
            DeliveryOutcome::Sent => &mut self.sent,
            DeliveryOutcome::Edited => &mut self.edited,
            DeliveryOutcome::Deleted => &mut self.deleted,
            DeliveryOutcome::Skipped => &mut self.skipped,
            DeliveryOutcome::Failed => &mut self.failed,
            DeliveryOutcome::TargetRemoved => &mut self.targets_removed,
        };
        *counter += 1;
    }

    pub fn merge(&mut self, other: &DeliveryReport) {
        self.sent += other.sent;
        self.edited += other.edited;
        self.deleted += other.deleted;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.targets_removed += other.targets_removed;
    }
}

impl Extend<DeliveryOutcome> for DeliveryReport {
    fn extend<I: IntoIterator<Item = DeliveryOutcome>>(&mut self, iter: I) {
        for outcome in iter {
            self.record(outcome);
        }
    }
}

fn chrono_duration(d: Duration) -> TimeDelta {
    TimeDelta::from_std(d).unwrap_or(TimeDelta::MAX)
}

/// Sends, edits and retires notices for tracked videos.
pub struct Notifier {
    messenger: Arc<dyn Messenger>,
    calendar: Option<CalendarManager>,
    targets: Arc<dyn TargetRepository>,
    notifications: Arc<dyn NotificationRepository>,
    reminders: Arc<dyn ReminderRepository>,
    config: NotifierConfig,
}

impl Notifier {
    pub fn new(
        messenger: Arc<dyn Messenger>,
        targets: Arc<dyn TargetRepository>,
        notifications: Arc<dyn NotificationRepository>,
        reminders: Arc<dyn ReminderRepository>,
        config: NotifierConfig,
    ) -> Self {
        Self {
            messenger,
            calendar: None,
            targets,
            notifications,
            reminders,
            config,
        }
    }

    /// Notifier backed by the SQLx repositories on `pool`.
    pub fn from_pool(pool: &DbPool, messenger: Arc<dyn Messenger>, config: NotifierConfig) -> Self {
        Self::new(
            messenger,
            Arc::new(SqlxTargetRepository::new(pool.clone())),
            Arc::new(SqlxNotificationRepository::new(pool.clone())),
            Arc::new(SqlxReminderRepository::new(pool.clone())),
            config,
        )
    }

    /// Enable scheduled-event mirroring for targets that ask for it.
    pub fn with_calendar(
        mut self,
        calendar: Arc<dyn EventCalendar>,
        events: Arc<dyn CalendarEventRepository>,
    ) -> Self {
        self.calendar = Some(CalendarManager::new(calendar, events, self.targets.clone()));
        self
    }

    /// [`with_calendar`](Self::with_calendar) using the SQLx event repository.
    pub fn with_calendar_pool(self, calendar: Arc<dyn EventCalendar>, pool: &DbPool) -> Self {
        self.with_calendar(calendar, Arc::new(SqlxCalendarEventRepository::new(pool.clone())))
    }

    /// A new stream was scheduled.
    pub async fn stream_created(
        &self,
        video: &VideoDbModel,
        info: &VideoInfo,
        start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<DeliveryReport> {
        let targets = self.targets.list_targets_for_channel(&video.channel_id).await?;
        Ok(self
            .fan_out(&video.video_id, targets, |target| {
                self.creation_one(target, video, info, start, now)
            })
            .await)
    }

    /// A scheduled stream was rechecked and is still upcoming.
    pub async fn stream_upcoming(
        &self,
        video: &VideoDbModel,
        info: &VideoInfo,
        schedule: &Schedule,
        now: DateTime<Utc>,
    ) -> Result<DeliveryReport> {
        let targets = self.targets.list_targets_for_channel(&video.channel_id).await?;
        Ok(self
            .fan_out(&video.video_id, targets, |target| {
                self.upcoming_one(target, video, info, schedule, now)
            })
            .await)
    }

    /// The stream just went live: announce it and fulfil reminders.
    pub async fn stream_start(
        &self,
        video: &VideoDbModel,
        info: &VideoInfo,
        now: DateTime<Utc>,
    ) -> Result<DeliveryReport> {
        let mut report = self.announce_live(video, info, LiveNoticeStyle::WentLive, now).await?;
        report.merge(&self.fulfil_reminders(video, info, now).await?);
        Ok(report)
    }

    /// The stream is still live: notify targets that have no notice yet.
    pub async fn backfill_live(
        &self,
        video: &VideoDbModel,
        info: &VideoInfo,
        now: DateTime<Utc>,
    ) -> Result<DeliveryReport> {
        self.announce_live(video, info, LiveNoticeStyle::Backfill, now).await
    }

    /// The stream ended. Every outstanding notice is turned into a summary
    /// (or deleted) and its row removed regardless of the outcome.
    ///
    /// `info` is the fresh platform record when the video still exists;
    /// otherwise the summary is built from `stats`.
    pub async fn stream_end(
        &self,
        video: &VideoDbModel,
        stats: &LiveStats,
        info: Option<&VideoInfo>,
        now: DateTime<Utc>,
    ) -> Result<DeliveryReport> {
        let notifications = self.notifications.list_for_video(&video.id).await?;

        let mut pending = Vec::with_capacity(notifications.len());
        let mut renames: Vec<String> = Vec::new();
        for notification in notifications {
            match self.targets.get_target(&notification.target_id).await {
                Ok(target) => {
                    let settings = target.settings();
                    if settings.rename_on_live && !renames.contains(&target.destination) {
                        renames.push(target.destination.clone());
                    }
                    pending.push((notification, settings));
                }
                Err(Error::NotFound { .. }) => {
                    self.notifications.delete_notification(&notification.id).await?;
                }
                Err(e) => {
                    warn!(
                        target_id = %notification.target_id,
                        video = %video.video_id,
                        error = %e,
                        "Target lookup failed, retiring notice with default settings"
                    );
                    pending.push((notification, TargetSettings::default()));
                }
            }
        }

        let channel_name = stats
            .channel_name
            .as_deref()
            .or(info.map(|i| i.channel.name.as_str()))
            .unwrap_or(video.video_id.as_str());
        let snapshot = EndedSnapshot {
            channel_name,
            last_title: video.last_title.as_deref(),
            stats,
        };

        let report = self
            .fan_out(&video.video_id, pending, |(notification, settings)| {
                self.retire_one(notification, settings, stats, info, &snapshot, now)
            })
            .await;

        for destination in renames {
            self.rename(&destination).await;
        }
        if let Some(calendar) = &self.calendar {
            calendar.complete_all(&video.id, now).await?;
        }
        Ok(report)
    }

    /// A regular video was uploaded.
    pub async fn video_uploaded(
        &self,
        video: &VideoDbModel,
        info: &VideoInfo,
        now: DateTime<Utc>,
    ) -> Result<DeliveryReport> {
        if info.is_vod() {
            debug!(video = %info.id, "Finished stream, not announcing as an upload");
            return Ok(DeliveryReport::default());
        }
        let max_age = chrono_duration(self.config.upload_max_age);
        if info.published.is_some_and(|published| now - published > max_age) {
            debug!(video = %info.id, "Upload too old to announce");
            return Ok(DeliveryReport::default());
        }

        let targets = self.targets.list_targets_for_channel(&video.channel_id).await?;
        Ok(self
            .fan_out(&video.video_id, targets, |target| self.upload_one(target, video, info, now))
            .await)
    }

    async fn announce_live(
        &self,
        video: &VideoDbModel,
        info: &VideoInfo,
        style: LiveNoticeStyle,
        now: DateTime<Utc>,
    ) -> Result<DeliveryReport> {
        let targets = self.targets.list_targets_for_channel(&video.channel_id).await?;
        Ok(self
            .fan_out(&video.video_id, targets, |target| {
                self.live_one(target, video, info, style, now)
            })
            .await)
    }

    async fn fulfil_reminders(
        &self,
        video: &VideoDbModel,
        info: &VideoInfo,
        now: DateTime<Utc>,
    ) -> Result<DeliveryReport> {
        let reminders = self.reminders.list_for_video(&video.id).await?;
        if reminders.is_empty() {
            return Ok(DeliveryReport::default());
        }

        let settings = TargetSettings::default();
        Ok(self
            .fan_out(&video.video_id, reminders, |reminder| {
                let settings = &settings;
                async move {
                    let mut message = content::live_notice(
                        info,
                        settings,
                        reminder.mention.clone(),
                        LiveNoticeStyle::WentLive,
                        false,
                    );
                    message.embed.timestamp = message.embed.timestamp.or(Some(now));
                    let outcome = match self
                        .messenger
                        .create_message(&reminder.destination, &message)
                        .await
                    {
                        Ok(_) => DeliveryOutcome::Sent,
                        Err(e) => {
                            warn!(destination = %reminder.destination, error = %e, "Failed to deliver stream reminder");
                            DeliveryOutcome::Failed
                        }
                    };
                    self.reminders.delete_reminder(&reminder.id).await?;
                    Ok::<_, Error>(outcome)
                }
            })
            .await)
    }

    async fn creation_one(
        &self,
        target: TargetDbModel,
        video: &VideoDbModel,
        info: &VideoInfo,
        start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<DeliveryOutcome> {
        let settings = target.settings();
        self.sync_calendar_upcoming(&target, &settings, video, info, start, now)
            .await;

        if !settings.allows(NoticeKind::Creation, info.member_limited, false) {
            return Ok(DeliveryOutcome::Skipped);
        }
        let mention = render_mention(&settings, NoticeKind::Creation, info, start);
        let message = content::creation_notice(info, start, &settings, mention);
        match self.messenger.create_message(&target.destination, &message).await {
            Ok(_) => Ok(DeliveryOutcome::Sent),
            Err(e) => self.create_failed(&target, &video.video_id, e).await,
        }
    }

    async fn upcoming_one(
        &self,
        target: TargetDbModel,
        video: &VideoDbModel,
        info: &VideoInfo,
        schedule: &Schedule,
        now: DateTime<Utc>,
    ) -> Result<DeliveryOutcome> {
        let settings = target.settings();
        self.sync_calendar_upcoming(&target, &settings, video, info, schedule.start, now)
            .await;

        let Some(window) = settings.upcoming_notice_window() else {
            return Ok(DeliveryOutcome::Skipped);
        };
        if !settings.allows(NoticeKind::Upcoming, info.member_limited, false)
            || schedule.until_start(now) > chrono_duration(window)
        {
            return Ok(DeliveryOutcome::Skipped);
        }
        if self
            .notifications
            .upcoming_notice_sent(&video.id, &target.id)
            .await?
        {
            return Ok(DeliveryOutcome::Skipped);
        }

        let mention = render_mention(&settings, NoticeKind::Upcoming, info, schedule.start);
        let message = content::upcoming_notice(info, schedule.start, &settings, mention);
        let destination = settings
            .upcoming_destination
            .as_deref()
            .unwrap_or(target.destination.as_str());

        let result = match self.messenger.create_message(destination, &message).await {
            Err(e @ (DeliveryError::PermissionDenied | DeliveryError::Gone))
                if destination != target.destination =>
            {
                info!(
                    target_id = %target.id,
                    destination,
                    reason = %e,
                    "Upcoming destination unusable, falling back to the target destination"
                );
                let fallback = TargetSettings {
                    upcoming_destination: None,
                    ..settings.clone()
                };
                self.targets.update_settings(&target.id, &fallback).await?;
                self.messenger
                    .create_message(&target.destination, &message)
                    .await
            }
            Err(e) if destination != target.destination => {
                warn!(target_id = %target.id, destination, error = %e, "Failed to deliver upcoming notice to alternate destination");
                return Ok(DeliveryOutcome::Failed);
            }
            result => result,
        };

        match result {
            Ok(message_id) => {
                self.notifications
                    .record_upcoming_notice(&video.id, &target.id, &message_id)
                    .await?;
                Ok(DeliveryOutcome::Sent)
            }
            Err(e) => self.create_failed(&target, &video.video_id, e).await,
        }
    }

    async fn live_one(
        &self,
        target: TargetDbModel,
        video: &VideoDbModel,
        info: &VideoInfo,
        style: LiveNoticeStyle,
        now: DateTime<Utc>,
    ) -> Result<DeliveryOutcome> {
        let settings = target.settings();
        if settings.calendar_events
            && let Some(calendar) = &self.calendar
            && let Err(e) = calendar.sync_live(&target, &video.id, info, now).await
        {
            warn!(target_id = %target.id, error = %e, "Scheduled event sync failed");
        }

        let kind = if info.premiere {
            NoticeKind::Premiere
        } else {
            NoticeKind::Live
        };
        if !settings.allows(kind, info.member_limited, false) {
            return Ok(DeliveryOutcome::Skipped);
        }
        if self
            .notifications
            .notification_exists(&target.id, &video.id)
            .await?
        {
            return Ok(DeliveryOutcome::Skipped);
        }

        let since = info.live_since();
        let stale = since.is_some_and(|since| now - since > chrono_duration(self.config.stale_mention));
        let mention = if stale {
            None
        } else {
            render_mention(&settings, kind, info, since.unwrap_or(now))
        };
        let message = content::live_notice(info, &settings, mention, style, stale);

        let message_id = match self.messenger.create_message(&target.destination, &message).await {
            Ok(message_id) => message_id,
            Err(e) => return self.create_failed(&target, &video.video_id, e).await,
        };
        let record = NotificationDbModel::new(
            &target.id,
            &video.id,
            &target.destination,
            message_id,
        );
        if !self.notifications.create_notification(&record).await? {
            debug!(target_id = %target.id, video = %video.video_id, "Live notice already recorded");
        }
        if settings.rename_on_live {
            self.rename(&target.destination).await;
        }
        Ok(DeliveryOutcome::Sent)
    }

    async fn upload_one(
        &self,
        target: TargetDbModel,
        video: &VideoDbModel,
        info: &VideoInfo,
        now: DateTime<Utc>,
    ) -> Result<DeliveryOutcome> {
        let settings = target.settings();
        if !settings.allows(NoticeKind::Upload, info.member_limited, info.short) {
            return Ok(DeliveryOutcome::Skipped);
        }
        if self
            .notifications
            .notification_exists(&target.id, &video.id)
            .await?
        {
            return Ok(DeliveryOutcome::Skipped);
        }

        let mention = render_mention(
            &settings,
            NoticeKind::Upload,
            info,
            info.published.unwrap_or(now),
        );
        let message = content::upload_notice(info, &settings, mention);
        match self.messenger.create_message(&target.destination, &message).await {
            Ok(message_id) => {
                let record = NotificationDbModel::new(
                    &target.id,
                    &video.id,
                    &target.destination,
                    message_id,
                );
                self.notifications.create_notification(&record).await?;
                Ok(DeliveryOutcome::Sent)
            }
            Err(e) => self.create_failed(&target, &video.video_id, e).await,
        }
    }

    async fn retire_one(
        &self,
        notification: NotificationDbModel,
        settings: TargetSettings,
        stats: &LiveStats,
        info: Option<&VideoInfo>,
        snapshot: &EndedSnapshot<'_>,
        now: DateTime<Utc>,
    ) -> Result<DeliveryOutcome> {
        let destination = notification.destination.as_str();
        let message_id = notification.message_id.as_str();

        let (result, done) = if settings.summaries {
            let message = match info {
                Some(info) => content::vod_summary(info, stats, &settings),
                None => content::no_vod_summary(snapshot, &settings, now),
            };
            let result = self
                .messenger
                .edit_message(destination, message_id, &message)
                .await;
            (result, DeliveryOutcome::Edited)
        } else {
            let result = self.messenger.delete_message(destination, message_id).await;
            (result, DeliveryOutcome::Deleted)
        };

        self.notifications.delete_notification(&notification.id).await?;
        match result {
            Ok(()) => Ok(done),
            Err(DeliveryError::Gone) => {
                debug!(destination, message_id, "Live notice already gone");
                Ok(DeliveryOutcome::Skipped)
            }
            Err(DeliveryError::PermissionDenied) => {
                info!(
                    target_id = %notification.target_id,
                    destination,
                    "Destination refused the summary, removing target"
                );
                if self.targets.delete_target(&notification.target_id).await? {
                    info!("Channel has no targets left, removed");
                }
                Ok(DeliveryOutcome::TargetRemoved)
            }
            Err(e) => {
                warn!(destination, message_id, error = %e, "Failed to retire live notice");
                Ok(DeliveryOutcome::Failed)
            }
        }
    }

    async fn sync_calendar_upcoming(
        &self,
        target: &TargetDbModel,
        settings: &TargetSettings,
        video: &VideoDbModel,
        info: &VideoInfo,
        start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) {
        if !settings.calendar_events {
            return;
        }
        if let Some(calendar) = &self.calendar
            && let Err(e) = calendar.sync_upcoming(target, &video.id, info, start, now).await
        {
            warn!(target_id = %target.id, error = %e, "Scheduled event sync failed");
        }
    }

    /// Apply the failure policy for a refused message creation.
    async fn create_failed(
        &self,
        target: &TargetDbModel,
        video_id: &str,
        error: DeliveryError,
    ) -> Result<DeliveryOutcome> {
        match error {
            DeliveryError::PermissionDenied | DeliveryError::Gone => {
                info!(
                    target_id = %target.id,
                    destination = %target.destination,
                    video = video_id,
                    reason = %error,
                    "Destination unusable, removing target"
                );
                if self.targets.delete_target(&target.id).await? {
                    info!(channel_id = %target.channel_id, "Channel has no targets left, removed");
                }
                Ok(DeliveryOutcome::TargetRemoved)
            }
            DeliveryError::Other(msg) => {
                warn!(
                    target_id = %target.id,
                    destination = %target.destination,
                    video = video_id,
                    error = %msg,
                    "Failed to send notice"
                );
                Ok(DeliveryOutcome::Failed)
            }
        }
    }

    async fn rename(&self, destination: &str) {
        let live = match self.targets.live_channel_names(destination).await {
            Ok(live) => live,
            Err(e) => {
                warn!(destination, error = %e, "Could not list live channels for rename");
                return;
            }
        };
        if let Err(e) = self.messenger.rename_destination(destination, &live).await {
            debug!(destination, error = %e, "Destination rename failed");
        }
    }

    /// Run `f` for every item with bounded concurrency and tally the outcomes.
    async fn fan_out<T, F, Fut>(&self, video_id: &str, items: Vec<T>, f: F) -> DeliveryReport
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<DeliveryOutcome>>,
    {
        stream::iter(items)
            .map(|item| {
                let fut = f(item);
                async move {
                    fut.await.unwrap_or_else(|e| {
                        warn!(video = video_id, error = %e, "Notice bookkeeping failed");
                        DeliveryOutcome::Failed
                    })
                }
            })
            .buffer_unordered(self.config.delivery_concurrency.max(1))
            .collect()
            .await
    }
}

fn render_mention(
    settings: &TargetSettings,
    kind: NoticeKind,
    info: &VideoInfo,
    timestamp: DateTime<Utc>,
) -> Option<String> {
    let ctx = MentionContext {
        channel_name: &info.channel.name,
        channel_id: &info.channel.id,
        url: &info.url,
        timestamp,
    };
    resolve_mention(settings, kind, info.member_limited)?.render(&ctx)
}
