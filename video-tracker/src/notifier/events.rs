//! Destination-native scheduled events.
//!
//! Targets with `calendar_events` enabled get one event per (target, video)
//! that follows the stream: created while upcoming or on go-live, moved when
//! the schedule changes, extended while the stream runs long, and completed
//! when it ends.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::Result;
use crate::database::models::{CalendarEventDbModel, TargetDbModel};
use crate::database::repositories::{CalendarEventRepository, TargetRepository};
use crate::database::time::{datetime_to_ms, ms_to_datetime};
use crate::messaging::{CalendarEventSpec, CalendarEventStatus, DeliveryError, EventCalendar};
use crate::notifier::content::abbreviate;
use crate::platform::VideoInfo;

/// Events can not start in the past or right now.
const START_LEAD: Duration = Duration::minutes(4);
/// Stream length assumed when an event is created.
const DEFAULT_LENGTH: Duration = Duration::hours(3);
/// Events ending sooner than this are left to expire instead of being completed.
const LET_EXPIRE: Duration = Duration::minutes(10);
/// Live events ending within this window are pushed back.
const EXTEND_WINDOW: Duration = Duration::minutes(15);
const EXTEND_BY: Duration = Duration::hours(2);
/// Starts further out are treated as placeholder streams.
const FUTURE_LIMIT: Duration = Duration::days(14);

const TITLE_MAX: usize = 100;
const DESCRIPTION_MAX: usize = 1000;

/// Start and end for a new event, or `None` when the start is too far out.
pub fn initial_window(
    scheduled: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = match scheduled {
        Some(start) if start - now > START_LEAD => start,
        _ => now + START_LEAD,
    };
    if start - now > FUTURE_LIMIT {
        return None;
    }
    Some((start, start + DEFAULT_LENGTH))
}

/// New window for an upcoming event whose schedule was re-read, or `None`
/// when the event should be cancelled.
pub fn rescheduled_window(
    scheduled: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    if scheduled - now > FUTURE_LIMIT {
        return None;
    }
    let start = if scheduled - now > START_LEAD {
        scheduled
    } else {
        now + START_LEAD * 2
    };
    Some((start, start + DEFAULT_LENGTH))
}

/// Extended end for a live event about to run out.
pub fn extended_end(end: DateTime<Utc>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    (end - now <= EXTEND_WINDOW).then(|| end + EXTEND_BY)
}

/// Whether an ended stream's event is worth completing early.
pub fn should_complete(end: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    end - now > LET_EXPIRE
}

fn event_spec(
    info: &VideoInfo,
    title: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> CalendarEventSpec {
    let mut description = format!("{} @ {}", info.channel.name, info.url);
    if !info.description.is_empty() {
        description.push_str("\nVideo description:\n");
        description.push_str(&info.description);
    }
    CalendarEventSpec {
        title: title.to_string(),
        description: abbreviate(&description, DESCRIPTION_MAX),
        location: abbreviate(&info.url, TITLE_MAX),
        start,
        end,
    }
}

/// Keeps calendar events in step with the streams they mirror.
pub struct CalendarManager {
    calendar: Arc<dyn EventCalendar>,
    events: Arc<dyn CalendarEventRepository>,
    targets: Arc<dyn TargetRepository>,
}

impl CalendarManager {
    pub fn new(
        calendar: Arc<dyn EventCalendar>,
        events: Arc<dyn CalendarEventRepository>,
        targets: Arc<dyn TargetRepository>,
    ) -> Self {
        Self {
            calendar,
            events,
            targets,
        }
    }

    /// Create or move the event for an upcoming stream.
    pub async fn sync_upcoming(
        &self,
        target: &TargetDbModel,
        video_id: &str,
        info: &VideoInfo,
        scheduled: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        match self.events.get_event(&target.id, video_id).await? {
            None => self.schedule(target, video_id, info, Some(scheduled), now).await,
            Some(event) if !event.valid => Ok(()),
            Some(event) => self.reschedule(&event, info, scheduled, now).await,
        }
    }

    /// Create the event for a live stream, or keep an existing one running.
    pub async fn sync_live(
        &self,
        target: &TargetDbModel,
        video_id: &str,
        info: &VideoInfo,
        now: DateTime<Utc>,
    ) -> Result<()> {
        match self.events.get_event(&target.id, video_id).await? {
            None => self.schedule(target, video_id, info, None, now).await,
            Some(event) if !event.valid => Ok(()),
            Some(event) => self.keep_alive(&event, info, now).await,
        }
    }

    /// Complete every event for an ended stream and forget them.
    pub async fn complete_all(&self, video_id: &str, now: DateTime<Utc>) -> Result<()> {
        for event in self.events.list_for_video(video_id).await? {
            if event.valid && should_complete(ms_to_datetime(event.end_time), now) {
                if let Err(e) = self
                    .calendar
                    .complete_event(&event.destination, &event.event_ref)
                    .await
                {
                    warn!(event = %event.event_ref, error = %e, "Failed to complete scheduled event");
                }
            }
            self.events.delete_event(&event.id).await?;
        }
        Ok(())
    }

    async fn schedule(
        &self,
        target: &TargetDbModel,
        video_id: &str,
        info: &VideoInfo,
        scheduled: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let Some((start, end)) = initial_window(scheduled, now) else {
            debug!(video = %info.id, "Start too far out, not creating a scheduled event");
            return Ok(());
        };
        let title = abbreviate(&info.title, TITLE_MAX);
        let spec = event_spec(info, &title, start, end);

        let event_ref = match self.calendar.schedule_event(&target.destination, &spec).await {
            Ok(event_ref) => event_ref,
            Err(DeliveryError::PermissionDenied) => {
                info!(target_id = %target.id, "Scheduled events refused, disabling them for target");
                let mut settings = target.settings();
                settings.calendar_events = false;
                self.targets.update_settings(&target.id, &settings).await?;
                return Ok(());
            }
            Err(e) => {
                warn!(target_id = %target.id, video = %info.id, error = %e, "Failed to create scheduled event");
                return Ok(());
            }
        };

        self.events
            .create_event(&CalendarEventDbModel {
                id: uuid::Uuid::new_v4().to_string(),
                target_id: target.id.clone(),
                video_id: video_id.to_string(),
                destination: target.destination.clone(),
                event_ref,
                start_time: datetime_to_ms(start),
                end_time: datetime_to_ms(end),
                title,
                valid: true,
            })
            .await
    }

    async fn reschedule(
        &self,
        event: &CalendarEventDbModel,
        info: &VideoInfo,
        scheduled: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let title = abbreviate(&info.title, TITLE_MAX);
        let Some((start, end)) = rescheduled_window(scheduled, now) else {
            info!(event = %event.event_ref, "Stream pushed far out, cancelling scheduled event");
            let spec = event_spec(
                info,
                &title,
                ms_to_datetime(event.start_time),
                ms_to_datetime(event.end_time),
            );
            self.update(event, &spec, CalendarEventStatus::Canceled).await?;
            return self.events.delete_event(&event.id).await;
        };

        if datetime_to_ms(start) == event.start_time && title == event.title {
            return Ok(());
        }
        debug!(event = %event.event_ref, "Moving scheduled event");
        let spec = event_spec(info, &title, start, end);
        if self.update(event, &spec, CalendarEventStatus::Scheduled).await? {
            self.events
                .update_event(&event.id, datetime_to_ms(start), datetime_to_ms(end), &title)
                .await?;
        }
        Ok(())
    }

    async fn keep_alive(
        &self,
        event: &CalendarEventDbModel,
        info: &VideoInfo,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let title = abbreviate(&info.title, TITLE_MAX);
        let end = ms_to_datetime(event.end_time);
        let extended = extended_end(end, now);
        if extended.is_none() && title == event.title {
            return Ok(());
        }

        let end = extended.unwrap_or(end);
        let spec = event_spec(info, &title, ms_to_datetime(event.start_time), end);
        if self.update(event, &spec, CalendarEventStatus::Active).await? {
            self.events
                .update_event(&event.id, event.start_time, datetime_to_ms(end), &title)
                .await?;
        }
        Ok(())
    }

    /// Push an update; `Ok(false)` when the facade refused it.
    async fn update(
        &self,
        event: &CalendarEventDbModel,
        spec: &CalendarEventSpec,
        status: CalendarEventStatus,
    ) -> Result<bool> {
        match self
            .calendar
            .update_event(&event.destination, &event.event_ref, spec, status)
            .await
        {
            Ok(()) => Ok(true),
            Err(DeliveryError::Gone | DeliveryError::PermissionDenied) => {
                debug!(event = %event.event_ref, "Scheduled event no longer editable, leaving it alone");
                self.events.invalidate_event(&event.id).await?;
                Ok(false)
            }
            Err(e) => {
                warn!(event = %event.event_ref, %status, error = %e, "Failed to update scheduled event");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[rstest]
    #[case(None, Duration::minutes(4))]
    #[case(Some(Duration::minutes(2)), Duration::minutes(4))]
    #[case(Some(Duration::hours(5)), Duration::hours(5))]
    fn test_initial_window(#[case] offset: Option<Duration>, #[case] expected: Duration) {
        let (start, end) = initial_window(offset.map(|o| t0() + o), t0()).unwrap();
        assert_eq!(start, t0() + expected);
        assert_eq!(end - start, Duration::hours(3));
    }

    #[test]
    fn test_far_future_skipped() {
        assert!(initial_window(Some(t0() + Duration::days(15)), t0()).is_none());
        assert!(rescheduled_window(t0() + Duration::days(15), t0()).is_none());
    }

    #[test]
    fn test_rescheduled_close_start_gets_double_lead() {
        let (start, _) = rescheduled_window(t0() + Duration::minutes(1), t0()).unwrap();
        assert_eq!(start, t0() + Duration::minutes(8));
    }

    #[rstest]
    #[case(Duration::minutes(30), None)]
    #[case(Duration::minutes(10), Some(Duration::minutes(130)))]
    #[case(Duration::minutes(-5), Some(Duration::minutes(115)))]
    fn test_extended_end(#[case] remaining: Duration, #[case] expected: Option<Duration>) {
        assert_eq!(
            extended_end(t0() + remaining, t0()),
            expected.map(|e| t0() + e)
        );
    }

    #[test]
    fn test_should_complete() {
        assert!(should_complete(t0() + Duration::hours(1), t0()));
        assert!(!should_complete(t0() + Duration::minutes(5), t0()));
    }
}
