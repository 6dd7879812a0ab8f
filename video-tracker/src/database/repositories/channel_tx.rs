//! Transactional operations for channels.

use sqlx::SqliteConnection;

use crate::Result;

/// Transactional operations for channels.
pub struct ChannelTxOps;

impl ChannelTxOps {
    /// Record a resolved lookup: refresh the display name and clear errors.
    pub async fn record_success(
        tx: &mut SqliteConnection,
        channel_id: &str,
        display_name: Option<&str>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE channels
            SET display_name = COALESCE(?, display_name),
                consecutive_error_count = 0,
                last_error = NULL
            WHERE id = ?
            "#,
        )
        .bind(display_name)
        .bind(channel_id)
        .execute(tx)
        .await?;

        Ok(result.rows_affected())
    }

    /// Increment the error count and set `last_error`. Returns the new count.
    pub async fn record_failure(
        tx: &mut SqliteConnection,
        channel_id: &str,
        error_message: &str,
    ) -> Result<i64> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE channels
            SET consecutive_error_count = consecutive_error_count + 1,
                last_error = ?
            WHERE id = ?
            RETURNING consecutive_error_count
            "#,
        )
        .bind(error_message)
        .bind(channel_id)
        .fetch_optional(tx)
        .await?;

        row.map(|r| r.0)
            .ok_or_else(|| crate::Error::not_found("Channel", channel_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{begin_immediate, init_pool_with_size, run_migrations};

    #[tokio::test]
    async fn test_channel_error_counter() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("t.db").display());
        let pool = init_pool_with_size(&url, 2).await.unwrap();
        run_migrations(&pool).await.unwrap();
        sqlx::query("INSERT INTO channels (id, platform_id, created_at) VALUES ('c1', 'UC1', 0)")
            .execute(&pool)
            .await
            .unwrap();

        let mut tx = begin_immediate(&pool).await.unwrap();
        assert_eq!(ChannelTxOps::record_failure(&mut tx, "c1", "timeout").await.unwrap(), 1);
        assert_eq!(ChannelTxOps::record_failure(&mut tx, "c1", "timeout").await.unwrap(), 2);
        ChannelTxOps::record_success(&mut tx, "c1", Some("Name")).await.unwrap();
        tx.commit().await.unwrap();

        let row: (i64, Option<String>, Option<String>) = sqlx::query_as(
            "SELECT consecutive_error_count, last_error, display_name FROM channels WHERE id = 'c1'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(row, (0, None, Some("Name".to_string())));
    }
}
