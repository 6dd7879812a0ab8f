//! One tick: gather, look up, apply.

use std::collections::HashMap;
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::batch::BatchCaller;
use super::candidates::{CallReason, gather_candidates};
use super::handlers::{HandleOutcome, Transition, TransitionHandler};
use crate::config::TrackerConfig;
use crate::database::repositories::ChannelTxOps;
use crate::database::time::datetime_to_ms;
use crate::database::{DbPool, GcConfig, GcReport, begin_immediate, run_gc};
use crate::notifier::{DeliveryReport, Notifier};
use crate::platform::VideoSource;
use crate::{Error, Result};

/// A video whose handling failed this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub video_id: String,
    /// `None` when the video was not among this tick's candidates.
    pub reason: Option<CallReason>,
    pub error: String,
}

/// Transition counts for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionCounts {
    pub io_failed: u32,
    pub unchanged: u32,
    pub deleted: u32,
    pub unresolved: u32,
    pub scheduled: u32,
    pub rescheduled: u32,
    pub schedules_dropped: u32,
    pub went_live: u32,
    pub still_live: u32,
    pub ended: u32,
    pub uploaded: u32,
}

impl TransitionCounts {
    fn record(&mut self, transition: &Transition) {
        let counter = match transition {
            Transition::IoFailed { .. } => &mut self.io_failed,
            Transition::Unchanged => &mut self.unchanged,
            Transition::Deleted => &mut self.deleted,
            Transition::Unresolved => &mut self.unresolved,
            Transition::Scheduled => &mut self.scheduled,
            Transition::Rescheduled => &mut self.rescheduled,
            Transition::ScheduleDropped => &mut self.schedules_dropped,
            Transition::WentLive => &mut self.went_live,
            Transition::StillLive => &mut self.still_live,
            Transition::StreamEnded => &mut self.ended,
            Transition::Uploaded => &mut self.uploaded,
        };
        *counter += 1;
    }
}

/// Summary of one tick.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub tick: u64,
    pub candidates: usize,
    /// Results handled, successfully or not.
    pub processed: usize,
    pub transitions: TransitionCounts,
    pub delivery: DeliveryReport,
    pub failures: Vec<ItemFailure>,
    pub gc: Option<GcReport>,
    /// The batch phase timed out or the tick failed before it.
    pub aborted: bool,
    pub elapsed: Duration,
}

/// Runs tick bodies against one platform.
pub struct VideoTracker {
    pool: DbPool,
    batch: BatchCaller,
    handler: Arc<TransitionHandler>,
    config: TrackerConfig,
    ticks: AtomicU64,
}

impl VideoTracker {
    pub fn new(
        pool: DbPool,
        source: Arc<dyn VideoSource>,
        notifier: Arc<Notifier>,
        config: TrackerConfig,
    ) -> Self {
        Self {
            batch: BatchCaller::new(source, &config),
            handler: Arc::new(TransitionHandler::new(pool.clone(), notifier)),
            pool,
            config,
            ticks: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn platform(&self) -> &'static str {
        self.batch.platform()
    }

    /// Run one tick.
    ///
    /// Errors are returned only when the gather phase fails; a batch timeout
    /// is reported through [`TickReport::aborted`]. Items dispatched before
    /// the timeout still run to completion.
    pub async fn run_tick(&self) -> Result<TickReport> {
        let started = Instant::now();
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        let now = Utc::now();
        let mut report = TickReport {
            tick,
            ..Default::default()
        };

        let gather_timeout = self.config.gather_timeout();
        let candidates = tokio::time::timeout(
            gather_timeout,
            gather_candidates(
                &self.pool,
                now,
                self.config.live_recheck(),
                self.batch.chunk_size(),
            ),
        )
        .await
        .map_err(|_| Error::Timeout(gather_timeout, "gathering candidates"))??;
        report.candidates = candidates.len();

        if !candidates.is_empty() {
            let ids: Vec<String> = candidates.keys().cloned().collect();
            let limit = self.batch.timeout_for(ids.len());
            let deadline = Instant::now() + limit;
            let semaphore = Arc::new(Semaphore::new(self.config.worker_concurrency.max(1)));
            let item_timeout = self.config.item_timeout();
            let mut tasks: JoinSet<(String, Result<HandleOutcome>)> = JoinSet::new();
            let mut spawned: HashMap<task::Id, String> = HashMap::new();

            let mut chunks = pin!(self.batch.stream(ids));
            loop {
                let results = match tokio::time::timeout_at(deadline, chunks.next()).await {
                    Ok(Some(results)) => results,
                    Ok(None) => break,
                    Err(_) => {
                        warn!(
                            platform = self.batch.platform(),
                            timeout = ?limit,
                            "Metadata lookups timed out, aborting the rest of this tick"
                        );
                        report.aborted = true;
                        break;
                    }
                };

                for (video_id, result) in results {
                    let permit = semaphore
                        .clone()
                        .acquire_owned()
                        .await
                        .map_err(|e| Error::Other(format!("worker pool closed: {e}")))?;
                    let handler = self.handler.clone();
                    let task_video_id = video_id.clone();
                    let handle = tasks.spawn(async move {
                        let _permit = permit;
                        let outcome =
                            tokio::time::timeout(item_timeout, handler.handle(&video_id, result, now))
                                .await
                                .unwrap_or_else(|_| Err(Error::Timeout(item_timeout, "handling a video")));
                        (video_id, outcome)
                    });
                    spawned.insert(handle.id(), task_video_id);
                }
            }

            let mut io_failures: HashMap<String, String> = HashMap::new();
            while let Some(joined) = tasks.join_next_with_id().await {
                report.processed += 1;
                let (video_id, outcome) = match joined {
                    Ok((id, done)) => {
                        spawned.remove(&id);
                        done
                    }
                    Err(e) => {
                        let video_id = spawned.remove(&e.id()).unwrap_or_default();
                        error!(video = %video_id, error = %e, "Video handler task failed");
                        report.failures.push(ItemFailure {
                            reason: candidates.get(&video_id).copied(),
                            video_id,
                            error: format!("handler task failed: {e}"),
                        });
                        continue;
                    }
                };
                let reason = candidates.get(&video_id).copied();
                match outcome {
                    Ok(outcome) => {
                        if let Transition::IoFailed {
                            channel_id: Some(channel_id),
                            message,
                        } = &outcome.transition
                        {
                            io_failures.insert(channel_id.clone(), message.clone());
                        }
                        report.transitions.record(&outcome.transition);
                        report.delivery.merge(&outcome.delivery);
                    }
                    Err(e) => report.failures.push(ItemFailure {
                        video_id,
                        reason,
                        error: e.to_string(),
                    }),
                }
            }

            if let Err(e) = self.record_channel_failures(&io_failures).await {
                warn!(error = %e, "Failed to record channel lookup errors");
            }
        }

        let every = self.config.cleanup_every_ticks;
        if every > 0 && tick % every == 0 {
            match run_gc(&self.pool, &GcConfig::from(&self.config), datetime_to_ms(now)).await {
                Ok(gc) => report.gc = Some(gc),
                Err(e) => warn!(error = %e, "Garbage collection failed"),
            }
        }

        report.elapsed = started.elapsed();
        log_report(self.batch.platform(), &report);
        Ok(report)
    }

    async fn record_channel_failures(&self, failures: &HashMap<String, String>) -> Result<()> {
        if failures.is_empty() {
            return Ok(());
        }
        let mut tx = begin_immediate(&self.pool).await?;
        for (channel_id, message) in failures {
            match ChannelTxOps::record_failure(&mut tx, channel_id, message).await {
                Ok(count) => debug!(channel_id, count, "Channel lookup failed"),
                Err(Error::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        tx.commit().await
    }
}

fn log_report(platform: &str, report: &TickReport) {
    let t = &report.transitions;
    let d = &report.delivery;
    if report.aborted {
        error!(
            platform,
            tick = report.tick,
            candidates = report.candidates,
            processed = report.processed,
            failures = ?report.failures,
            "Tick aborted"
        );
    } else if !report.failures.is_empty() {
        warn!(
            platform,
            tick = report.tick,
            count = report.failures.len(),
            failures = ?report.failures,
            "Some videos could not be handled"
        );
    }
    if report.candidates == 0 && report.gc.is_none() {
        debug!(platform, tick = report.tick, "Tick found nothing to look up");
        return;
    }
    info!(
        platform,
        tick = report.tick,
        candidates = report.candidates,
        processed = report.processed,
        scheduled = t.scheduled,
        rescheduled = t.rescheduled,
        went_live = t.went_live,
        still_live = t.still_live,
        ended = t.ended,
        uploaded = t.uploaded,
        dropped = t.schedules_dropped + t.deleted,
        io_failed = t.io_failed,
        sent = d.sent,
        edited = d.edited,
        deleted = d.deleted,
        delivery_failed = d.failed,
        targets_removed = d.targets_removed,
        gc_removed = report.gc.map(|g| g.total()),
        elapsed = ?report.elapsed,
        "Tick complete"
    );
}
