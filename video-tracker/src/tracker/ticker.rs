//! Single-flight polling driver.
//!
//! The ticker owns the cadence: at most one tick runs at a time, a wake-up
//! that finds the lock held is dropped, and the lock is only released a
//! fixed cooldown after each tick finishes.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::service::{TickReport, VideoTracker};

/// Outcome of [`Ticker::try_tick`].
#[derive(Debug)]
pub enum TickAttempt {
    Ran(TickReport),
    /// Another tick held the lock; nothing was done.
    Skipped,
}

impl TickAttempt {
    pub fn report(&self) -> Option<&TickReport> {
        match self {
            Self::Ran(report) => Some(report),
            Self::Skipped => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }
}

/// Drives a [`VideoTracker`] on its configured cadence.
pub struct Ticker {
    tracker: Arc<VideoTracker>,
    lock: Arc<tokio::sync::Mutex<()>>,
    next_call: Mutex<Instant>,
    wake: Notify,
    cancel: CancellationToken,
}

impl Ticker {
    pub fn new(tracker: Arc<VideoTracker>) -> Self {
        Self {
            tracker,
            lock: Arc::new(tokio::sync::Mutex::new(())),
            next_call: Mutex::new(Instant::now()),
            wake: Notify::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Run one tick unless another is in flight or cooling down.
    ///
    /// A failed tick is logged and reported as aborted. Either way the lock
    /// is released `call_delay` later and the next scheduled call moves to
    /// `minimum_repeat_time` from now.
    pub async fn try_tick(&self) -> TickAttempt {
        let Ok(guard) = self.lock.clone().try_lock_owned() else {
            debug!("Tick already in flight, skipping");
            return TickAttempt::Skipped;
        };

        let report = match self.tracker.run_tick().await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "Tick failed");
                TickReport {
                    aborted: true,
                    ..Default::default()
                }
            }
        };

        let config = self.tracker.config();
        *self.next_call.lock() = Instant::now() + config.minimum_repeat_time();

        let cooldown = config.call_delay();
        if cooldown.is_zero() {
            drop(guard);
        } else {
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(cooldown) => {}
                    _ = cancel.cancelled() => {}
                }
                drop(guard);
            });
        }

        TickAttempt::Ran(report)
    }

    /// Cut the current wait short.
    pub fn nudge(&self) {
        *self.next_call.lock() = Instant::now();
        self.wake.notify_one();
    }

    /// Stop the loop started by [`spawn`](Self::spawn).
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run the polling loop on a new task until [`stop`](Self::stop).
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(&self) {
        info!(platform = self.tracker.platform(), "Tracker started");
        loop {
            let next = *self.next_call.lock();
            if Instant::now() < next {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep_until(next) => {}
                    _ = self.wake.notified() => {}
                }
                continue;
            }
            if self.cancel.is_cancelled() {
                break;
            }

            if self.try_tick().await.is_skipped() {
                *self.next_call.lock() = Instant::now() + self.tracker.config().minimum_repeat_time();
            }
        }
        info!(platform = self.tracker.platform(), "Tracker stopped");
    }
}
