//! Garbage collection of video rows the tracker no longer needs.
//!
//! - Videos not polled within the retention window (never UPCOMING or LIVE)
//! - Schedules whose start is long past without the stream going live
//! - NEW videos the platform keeps resolving without usable data

use std::time::Duration;

use crate::Result;
use crate::config::TrackerConfig;
use crate::database::time::duration_ms;
use crate::database::{DbPool, begin_immediate};

/// GC thresholds.
#[derive(Debug, Clone)]
pub struct GcConfig {
    pub video_retention: Duration,
    pub overdue_schedule_grace: Duration,
    pub max_new_attempts: i64,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self::from(&TrackerConfig::default())
    }
}

impl From<&TrackerConfig> for GcConfig {
    fn from(config: &TrackerConfig) -> Self {
        Self {
            video_retention: config.video_retention(),
            overdue_schedule_grace: config.overdue_schedule_grace(),
            max_new_attempts: config.max_new_attempts,
        }
    }
}

/// Row counts touched by one GC pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcReport {
    pub expired_videos: u64,
    pub overdue_schedules: u64,
    pub unresolved_videos: u64,
}

impl GcReport {
    pub fn total(&self) -> u64 {
        self.expired_videos + self.overdue_schedules + self.unresolved_videos
    }
}

/// Run one GC pass at `now` (epoch ms) in a single write transaction.
pub async fn run_gc(pool: &DbPool, config: &GcConfig, now: i64) -> Result<GcReport> {
    let retention_cutoff = now.saturating_sub(duration_ms(config.video_retention));
    let overdue_cutoff = now.saturating_sub(duration_ms(config.overdue_schedule_grace));

    let mut tx = begin_immediate(pool).await?;

    let expired_videos = sqlx::query(
        r#"
        DELETE FROM videos
        WHERE state IN ('NEW', 'ENDED')
          AND last_api_call IS NOT NULL
          AND last_api_call <= ?
        "#,
    )
    .bind(retention_cutoff)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    sqlx::query(
        r#"
        DELETE FROM upcoming_notices
        WHERE video_id IN (
            SELECT id FROM videos WHERE state = 'UPCOMING' AND scheduled_start < ?
        )
        "#,
    )
    .bind(overdue_cutoff)
    .execute(&mut *tx)
    .await?;

    let overdue_schedules = sqlx::query(
        r#"
        UPDATE videos
        SET state = 'ENDED',
            scheduled_start = NULL,
            next_check = NULL,
            api_calls = NULL
        WHERE state = 'UPCOMING' AND scheduled_start < ?
        "#,
    )
    .bind(overdue_cutoff)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let unresolved_videos =
        sqlx::query("DELETE FROM videos WHERE state = 'NEW' AND api_attempts > ?")
            .bind(config.max_new_attempts)
            .execute(&mut *tx)
            .await?
            .rows_affected();

    tx.commit().await?;

    let report = GcReport {
        expired_videos,
        overdue_schedules,
        unresolved_videos,
    };
    if report.total() > 0 {
        tracing::info!(
            expired = report.expired_videos,
            overdue = report.overdue_schedules,
            unresolved = report.unresolved_videos,
            "Video garbage collection removed stale rows"
        );
    } else {
        tracing::debug!("Video garbage collection found nothing to remove");
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{init_pool_with_size, run_migrations};

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    #[tokio::test]
    async fn test_gc_rules() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("t.db").display());
        let pool = init_pool_with_size(&url, 2).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let now = 1_700_000_000_000i64;
        sqlx::query("INSERT INTO channels (id, platform_id, created_at) VALUES ('c', 'UC', 0)")
            .execute(&pool)
            .await
            .unwrap();

        let insert = |id: &'static str, state: &'static str, last_call: Option<i64>, attempts: i64| {
            let pool = pool.clone();
            async move {
                sqlx::query(
                    "INSERT INTO videos (id, video_id, channel_id, state, last_api_call, api_attempts, created_at) VALUES (?, ?, 'c', ?, ?, ?, 0)",
                )
                .bind(id)
                .bind(id)
                .bind(state)
                .bind(last_call)
                .bind(attempts)
                .execute(&pool)
                .await
                .unwrap();
            }
        };

        insert("old-ended", "ENDED", Some(now - 40 * DAY_MS), 0).await;
        insert("fresh-ended", "ENDED", Some(now - DAY_MS), 0).await;
        insert("hopeless", "NEW", None, 11).await;
        insert("trying", "NEW", None, 3).await;

        for (id, start) in [("overdue", now - 2 * DAY_MS), ("soon", now + DAY_MS)] {
            sqlx::query(
                "INSERT INTO videos (id, video_id, channel_id, state, last_api_call, scheduled_start, next_check, api_calls, created_at) VALUES (?, ?, 'c', 'UPCOMING', ?, ?, ?, 0, 0)",
            )
            .bind(id)
            .bind(id)
            .bind(now - 40 * DAY_MS)
            .bind(start)
            .bind(start)
            .execute(&pool)
            .await
            .unwrap();
        }

        let report = run_gc(&pool, &GcConfig::default(), now).await.unwrap();
        assert_eq!(
            report,
            GcReport {
                expired_videos: 1,
                overdue_schedules: 1,
                unresolved_videos: 1,
            }
        );

        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT id, state FROM videos ORDER BY id")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(
            rows,
            vec![
                ("fresh-ended".to_string(), "ENDED".to_string()),
                ("overdue".to_string(), "ENDED".to_string()),
                ("soon".to_string(), "UPCOMING".to_string()),
                ("trying".to_string(), "NEW".to_string()),
            ]
        );
    }
}
