//! One-shot reminder repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::VideoReminderDbModel;

#[async_trait]
pub trait ReminderRepository: Send + Sync {
    async fn create_reminder(&self, reminder: &VideoReminderDbModel) -> Result<()>;
    async fn list_for_video(&self, video_id: &str) -> Result<Vec<VideoReminderDbModel>>;
    async fn delete_reminder(&self, id: &str) -> Result<()>;
}

/// SQLx implementation of ReminderRepository.
pub struct SqlxReminderRepository {
    pool: SqlitePool,
}

impl SqlxReminderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReminderRepository for SqlxReminderRepository {
    async fn create_reminder(&self, reminder: &VideoReminderDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO video_reminders (id, video_id, destination, mention, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&reminder.id)
        .bind(&reminder.video_id)
        .bind(&reminder.destination)
        .bind(&reminder.mention)
        .bind(reminder.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_for_video(&self, video_id: &str) -> Result<Vec<VideoReminderDbModel>> {
        let reminders = sqlx::query_as::<_, VideoReminderDbModel>(
            "SELECT * FROM video_reminders WHERE video_id = ? ORDER BY created_at",
        )
        .bind(video_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(reminders)
    }

    async fn delete_reminder(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM video_reminders WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
