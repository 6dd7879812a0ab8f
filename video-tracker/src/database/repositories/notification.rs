//! Notification bookkeeping repository.
//!
//! The existence checks here are what make delivery idempotent across
//! restarts: a notice is only sent when no row records it yet.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::NotificationDbModel;

/// Notification repository trait.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn notification_exists(&self, target_id: &str, video_id: &str) -> Result<bool>;
    /// Insert unless the (target, video) pair already has a row.
    /// Returns whether a row was inserted.
    async fn create_notification(&self, notification: &NotificationDbModel) -> Result<bool>;
    async fn list_for_video(&self, video_id: &str) -> Result<Vec<NotificationDbModel>>;
    async fn delete_notification(&self, id: &str) -> Result<()>;

    async fn upcoming_notice_sent(&self, video_id: &str, target_id: &str) -> Result<bool>;
    async fn record_upcoming_notice(
        &self,
        video_id: &str,
        target_id: &str,
        message_id: &str,
    ) -> Result<()>;
}

/// SQLx implementation of NotificationRepository.
pub struct SqlxNotificationRepository {
    pool: SqlitePool,
}

impl SqlxNotificationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationRepository for SqlxNotificationRepository {
    async fn notification_exists(&self, target_id: &str, video_id: &str) -> Result<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM notifications WHERE target_id = ? AND video_id = ?")
                .bind(target_id)
                .bind(video_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    async fn create_notification(&self, notification: &NotificationDbModel) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO notifications (id, target_id, video_id, destination, message_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(target_id, video_id) DO NOTHING
            "#,
        )
        .bind(&notification.id)
        .bind(&notification.target_id)
        .bind(&notification.video_id)
        .bind(&notification.destination)
        .bind(&notification.message_id)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_for_video(&self, video_id: &str) -> Result<Vec<NotificationDbModel>> {
        let notifications = sqlx::query_as::<_, NotificationDbModel>(
            "SELECT * FROM notifications WHERE video_id = ? ORDER BY created_at",
        )
        .bind(video_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(notifications)
    }

    async fn delete_notification(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM notifications WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upcoming_notice_sent(&self, video_id: &str, target_id: &str) -> Result<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM upcoming_notices WHERE video_id = ? AND target_id = ?")
                .bind(video_id)
                .bind(target_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    async fn record_upcoming_notice(
        &self,
        video_id: &str,
        target_id: &str,
        message_id: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO upcoming_notices (video_id, target_id, message_id, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(video_id, target_id) DO NOTHING
            "#,
        )
        .bind(video_id)
        .bind(target_id)
        .bind(message_id)
        .bind(crate::database::time::now_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::TargetDbModel;
    use crate::database::repositories::{
        ChannelRepository, SqlxChannelRepository, SqlxTargetRepository, SqlxVideoRepository,
        TargetRepository, VideoRepository,
    };
    use crate::database::{init_pool_with_size, run_migrations};
    use crate::domain::TargetSettings;

    #[tokio::test]
    async fn test_one_notification_per_target_and_video() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("t.db").display());
        let pool = init_pool_with_size(&url, 2).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let channel = SqlxChannelRepository::new(pool.clone())
            .get_or_create_channel("UC1")
            .await
            .unwrap();
        let video = SqlxVideoRepository::new(pool.clone())
            .get_or_create_video("yt1", &channel.id)
            .await
            .unwrap();
        let target = TargetDbModel::new(&channel.id, "dest", &TargetSettings::default()).unwrap();
        SqlxTargetRepository::new(pool.clone())
            .create_target(&target)
            .await
            .unwrap();

        let repo = SqlxNotificationRepository::new(pool.clone());
        assert!(!repo.notification_exists(&target.id, &video.id).await.unwrap());

        let first = NotificationDbModel::new(&target.id, &video.id, "dest", "m1");
        let second = NotificationDbModel::new(&target.id, &video.id, "dest", "m2");
        assert!(repo.create_notification(&first).await.unwrap());
        assert!(!repo.create_notification(&second).await.unwrap());
        assert!(repo.notification_exists(&target.id, &video.id).await.unwrap());

        let rows = repo.list_for_video(&video.id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].message_id, "m1");

        repo.delete_notification(&first.id).await.unwrap();
        assert!(repo.list_for_video(&video.id).await.unwrap().is_empty());
    }
}
