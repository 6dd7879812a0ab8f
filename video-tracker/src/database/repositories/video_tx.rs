//! Transactional operations for videos.
//!
//! Candidate queries used by the gatherer's read transaction and the state
//! writes done by transition handlers inside `BEGIN IMMEDIATE`.

use sqlx::SqliteConnection;

use crate::Result;
use crate::database::models::{VideoDbModel, VideoStateColumns};
use crate::domain::VideoState;

/// Transactional operations for videos.
///
/// These methods operate within an existing transaction and do NOT commit.
/// The caller is responsible for committing or rolling back the transaction.
pub struct VideoTxOps;

impl VideoTxOps {
    pub async fn get_by_video_id(
        tx: &mut SqliteConnection,
        video_id: &str,
    ) -> Result<Option<VideoDbModel>> {
        let video = sqlx::query_as::<_, VideoDbModel>("SELECT * FROM videos WHERE video_id = ?")
            .bind(video_id)
            .fetch_optional(tx)
            .await?;
        Ok(video)
    }

    /// Live videos whose last successful poll is at or before `stale_before`.
    pub async fn stale_live(tx: &mut SqliteConnection, stale_before: i64) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT video_id FROM videos
            WHERE state = 'LIVE'
              AND (last_api_call IS NULL OR last_api_call <= ?)
            "#,
        )
        .bind(stale_before)
        .fetch_all(tx)
        .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    /// Upcoming videos whose recheck time has passed.
    pub async fn due_upcoming(tx: &mut SqliteConnection, now: i64) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT video_id FROM videos WHERE state = 'UPCOMING' AND next_check <= ?")
                .bind(now)
                .fetch_all(tx)
                .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    /// Videos never resolved by the platform.
    pub async fn new_videos(tx: &mut SqliteConnection) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT video_id FROM videos WHERE state = 'NEW'")
            .fetch_all(tx)
            .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    /// Up to `limit` upcoming videos in random order.
    pub async fn random_upcoming(tx: &mut SqliteConnection, limit: usize) -> Result<Vec<String>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT video_id FROM videos WHERE state = 'UPCOMING' ORDER BY RANDOM() LIMIT ?",
        )
        .bind(limit)
        .fetch_all(tx)
        .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    /// Record a successful lookup: poll time and the cached title/flags.
    pub async fn touch(
        tx: &mut SqliteConnection,
        id: &str,
        now: i64,
        title: &str,
        member_limited: bool,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE videos
            SET last_api_call = ?,
                last_title = ?,
                member_limited = ?
            WHERE id = ?
            "#,
        )
        .bind(now)
        .bind(title)
        .bind(member_limited)
        .bind(id)
        .execute(tx)
        .await?;

        Ok(result.rows_affected())
    }

    /// Replace the video's state and all state-specific columns.
    pub async fn set_state(tx: &mut SqliteConnection, id: &str, state: &VideoState) -> Result<u64> {
        let columns = VideoStateColumns::from_state(state);
        let result = sqlx::query(
            r#"
            UPDATE videos
            SET state = ?,
                scheduled_start = ?,
                next_check = ?,
                api_calls = ?,
                peak_viewers = ?,
                average_viewers = ?,
                uptime_ticks = ?,
                last_thumbnail = ?,
                last_channel_name = ?,
                premiere = ?
            WHERE id = ?
            "#,
        )
        .bind(columns.state)
        .bind(columns.scheduled_start)
        .bind(columns.next_check)
        .bind(columns.api_calls)
        .bind(columns.peak_viewers)
        .bind(columns.average_viewers)
        .bind(columns.uptime_ticks)
        .bind(columns.last_thumbnail)
        .bind(columns.last_channel_name)
        .bind(columns.premiere)
        .bind(id)
        .execute(tx)
        .await?;

        Ok(result.rows_affected())
    }

    /// Move `video` to `state`, rejecting moves the lifecycle does not allow.
    pub async fn transition(
        tx: &mut SqliteConnection,
        video: &VideoDbModel,
        state: &VideoState,
    ) -> Result<u64> {
        video.kind()?.transition_to(state.kind())?;
        Self::set_state(tx, &video.id, state).await
    }

    /// Count a lookup that resolved without a usable schedule.
    pub async fn bump_api_attempts(tx: &mut SqliteConnection, id: &str) -> Result<u64> {
        let result = sqlx::query("UPDATE videos SET api_attempts = api_attempts + 1 WHERE id = ?")
            .bind(id)
            .execute(tx)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete the video; notifications, notices and reminders cascade.
    pub async fn delete(tx: &mut SqliteConnection, id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM videos WHERE id = ?")
            .bind(id)
            .execute(tx)
            .await?;
        Ok(result.rows_affected())
    }

    /// Forget which targets got the "upcoming" notice for this video.
    pub async fn clear_upcoming_notices(tx: &mut SqliteConnection, id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM upcoming_notices WHERE video_id = ?")
            .bind(id)
            .execute(tx)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{begin_immediate, init_pool_with_size, run_migrations, DbPool};
    use crate::domain::{LiveStats, Schedule};
    use chrono::{DateTime, Duration};

    async fn setup_test_db() -> (tempfile::TempDir, DbPool) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("t.db").display());
        let pool = init_pool_with_size(&url, 2).await.unwrap();
        run_migrations(&pool).await.unwrap();

        sqlx::query(
            "INSERT INTO channels (id, platform_id, created_at) VALUES ('c1', 'UC1', 0)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO videos (id, video_id, channel_id, state, created_at) VALUES ('v1', 'yt1', 'c1', 'NEW', 0)",
        )
        .execute(&pool)
        .await
        .unwrap();

        (dir, pool)
    }

    #[tokio::test]
    async fn test_set_state_clears_previous_variant() {
        let (_dir, pool) = setup_test_db().await;
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        let mut tx = begin_immediate(&pool).await.unwrap();
        let upcoming = VideoState::Upcoming(Schedule::discovered(now + Duration::hours(1), now));
        assert_eq!(VideoTxOps::set_state(&mut tx, "v1", &upcoming).await.unwrap(), 1);
        let live = VideoState::Live(LiveStats::started(true, Some("thumb".into()), None));
        VideoTxOps::set_state(&mut tx, "v1", &live).await.unwrap();
        tx.commit().await.unwrap();

        let row: (String, Option<i64>, Option<i64>) =
            sqlx::query_as("SELECT state, scheduled_start, uptime_ticks FROM videos WHERE id = 'v1'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(row.0, "LIVE");
        assert_eq!(row.1, None);
        assert_eq!(row.2, Some(0));
    }

    #[tokio::test]
    async fn test_inconsistent_row_rejected() {
        let (_dir, pool) = setup_test_db().await;
        let result = sqlx::query("UPDATE videos SET state = 'LIVE' WHERE id = 'v1'")
            .execute(&pool)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_candidate_queries() {
        let (_dir, pool) = setup_test_db().await;
        let now = 1_700_000_000_000i64;
        let mut conn = pool.acquire().await.unwrap();

        assert_eq!(VideoTxOps::new_videos(&mut conn).await.unwrap(), vec!["yt1"]);
        assert!(VideoTxOps::due_upcoming(&mut conn, now).await.unwrap().is_empty());

        sqlx::query(
            "UPDATE videos SET state = 'UPCOMING', scheduled_start = ?, next_check = ?, api_calls = 0 WHERE id = 'v1'",
        )
        .bind(now + 60_000)
        .bind(now - 1)
        .execute(&mut *conn)
        .await
        .unwrap();

        assert!(VideoTxOps::new_videos(&mut conn).await.unwrap().is_empty());
        assert_eq!(VideoTxOps::due_upcoming(&mut conn, now).await.unwrap(), vec!["yt1"]);
        assert_eq!(VideoTxOps::random_upcoming(&mut conn, 5).await.unwrap(), vec!["yt1"]);
        assert!(VideoTxOps::due_upcoming(&mut conn, now - 10).await.unwrap().is_empty());
    }
}
