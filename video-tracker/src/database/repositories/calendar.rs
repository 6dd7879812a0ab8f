//! Calendar event repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::CalendarEventDbModel;

#[async_trait]
pub trait CalendarEventRepository: Send + Sync {
    async fn get_event(&self, target_id: &str, video_id: &str)
    -> Result<Option<CalendarEventDbModel>>;
    async fn list_for_video(&self, video_id: &str) -> Result<Vec<CalendarEventDbModel>>;
    async fn create_event(&self, event: &CalendarEventDbModel) -> Result<()>;
    async fn update_event(&self, id: &str, start_time: i64, end_time: i64, title: &str)
    -> Result<()>;
    /// Stop managing an event the destination no longer knows about.
    async fn invalidate_event(&self, id: &str) -> Result<()>;
    async fn delete_event(&self, id: &str) -> Result<()>;
}

/// SQLx implementation of CalendarEventRepository.
pub struct SqlxCalendarEventRepository {
    pool: SqlitePool,
}

impl SqlxCalendarEventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CalendarEventRepository for SqlxCalendarEventRepository {
    async fn get_event(
        &self,
        target_id: &str,
        video_id: &str,
    ) -> Result<Option<CalendarEventDbModel>> {
        let event = sqlx::query_as::<_, CalendarEventDbModel>(
            "SELECT * FROM calendar_events WHERE target_id = ? AND video_id = ?",
        )
        .bind(target_id)
        .bind(video_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(event)
    }

    async fn list_for_video(&self, video_id: &str) -> Result<Vec<CalendarEventDbModel>> {
        let events = sqlx::query_as::<_, CalendarEventDbModel>(
            "SELECT * FROM calendar_events WHERE video_id = ?",
        )
        .bind(video_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    async fn create_event(&self, event: &CalendarEventDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO calendar_events
                (id, target_id, video_id, destination, event_ref, start_time, end_time, title, valid)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(target_id, video_id) DO UPDATE SET
                event_ref = excluded.event_ref,
                start_time = excluded.start_time,
                end_time = excluded.end_time,
                title = excluded.title,
                valid = excluded.valid
            "#,
        )
        .bind(&event.id)
        .bind(&event.target_id)
        .bind(&event.video_id)
        .bind(&event.destination)
        .bind(&event.event_ref)
        .bind(event.start_time)
        .bind(event.end_time)
        .bind(&event.title)
        .bind(event.valid)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_event(
        &self,
        id: &str,
        start_time: i64,
        end_time: i64,
        title: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE calendar_events SET start_time = ?, end_time = ?, title = ? WHERE id = ?",
        )
        .bind(start_time)
        .bind(end_time)
        .bind(title)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn invalidate_event(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE calendar_events SET valid = 0 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_event(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM calendar_events WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
