//! Candidate gathering.
//!
//! One short read transaction collects every video due for a platform
//! lookup this tick. The transaction is closed before any network call.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::Result;
use crate::database::DbPool;
use crate::database::repositories::VideoTxOps;
use crate::database::time::{datetime_to_ms, duration_ms};

/// Why a video is looked up this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum CallReason {
    /// Live and not polled within the recheck window.
    Live,
    /// Upcoming with its recheck time elapsed.
    Scheduled,
    /// Never resolved.
    New,
    /// Random upcoming video filling spare room in the last chunk.
    Backfill,
}

/// Platform video id to lookup reason, deduplicated.
pub type CandidateMap = HashMap<String, CallReason>;

/// Collect this tick's lookups.
///
/// A video qualifying for several reasons keeps the first one found. When
/// the total does not fill the last chunk of `chunk_size`, the spare room is
/// filled with random upcoming videos not already present.
pub async fn gather_candidates(
    pool: &DbPool,
    now: DateTime<Utc>,
    live_recheck: Duration,
    chunk_size: usize,
) -> Result<CandidateMap> {
    let now_ms = datetime_to_ms(now);
    let mut tx = pool.begin().await?;

    let mut candidates = CandidateMap::new();
    let stale_before = now_ms.saturating_sub(duration_ms(live_recheck));
    for id in VideoTxOps::stale_live(&mut tx, stale_before).await? {
        candidates.entry(id).or_insert(CallReason::Live);
    }
    for id in VideoTxOps::due_upcoming(&mut tx, now_ms).await? {
        candidates.entry(id).or_insert(CallReason::Scheduled);
    }
    for id in VideoTxOps::new_videos(&mut tx).await? {
        candidates.entry(id).or_insert(CallReason::New);
    }

    let remainder = candidates.len() % chunk_size.max(1);
    if remainder != 0 {
        let room = chunk_size - remainder;
        // Over-fetch so ids already present do not eat into the room.
        let extra = VideoTxOps::random_upcoming(&mut tx, room + candidates.len()).await?;
        let mut added = 0;
        for id in extra {
            if added == room {
                break;
            }
            if !candidates.contains_key(&id) {
                candidates.insert(id, CallReason::Backfill);
                added += 1;
            }
        }
        debug!(added, room, "Backfilled last chunk with upcoming videos");
    }

    tx.commit().await?;
    Ok(candidates)
}
