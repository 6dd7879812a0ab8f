//! Target repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::begin_immediate;
use crate::database::models::TargetDbModel;
use crate::domain::TargetSettings;
use crate::{Error, Result};

/// Target repository trait.
#[async_trait]
pub trait TargetRepository: Send + Sync {
    async fn create_target(&self, target: &TargetDbModel) -> Result<()>;
    async fn get_target(&self, id: &str) -> Result<TargetDbModel>;
    async fn list_targets_for_channel(&self, channel_id: &str) -> Result<Vec<TargetDbModel>>;
    async fn update_settings(&self, id: &str, settings: &TargetSettings) -> Result<()>;
    /// Delete a target, and its channel if no other target references it.
    ///
    /// Returns whether the channel was removed as well.
    async fn delete_target(&self, id: &str) -> Result<bool>;
    /// Names of tracked channels that are live in `destination`.
    async fn live_channel_names(&self, destination: &str) -> Result<Vec<String>>;
}

/// SQLx implementation of TargetRepository.
pub struct SqlxTargetRepository {
    pool: SqlitePool,
}

impl SqlxTargetRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TargetRepository for SqlxTargetRepository {
    async fn create_target(&self, target: &TargetDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO targets (id, channel_id, destination, settings, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&target.id)
        .bind(&target.channel_id)
        .bind(&target.destination)
        .bind(&target.settings)
        .bind(target.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_target(&self, id: &str) -> Result<TargetDbModel> {
        sqlx::query_as::<_, TargetDbModel>("SELECT * FROM targets WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Target", id))
    }

    async fn list_targets_for_channel(&self, channel_id: &str) -> Result<Vec<TargetDbModel>> {
        let targets = sqlx::query_as::<_, TargetDbModel>(
            "SELECT * FROM targets WHERE channel_id = ? ORDER BY created_at",
        )
        .bind(channel_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(targets)
    }

    async fn update_settings(&self, id: &str, settings: &TargetSettings) -> Result<()> {
        let result = sqlx::query("UPDATE targets SET settings = ? WHERE id = ?")
            .bind(settings.to_json()?)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("Target", id));
        }
        Ok(())
    }

    async fn delete_target(&self, id: &str) -> Result<bool> {
        let mut tx = begin_immediate(&self.pool).await?;

        let channel: Option<(String,)> =
            sqlx::query_as("DELETE FROM targets WHERE id = ? RETURNING channel_id")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some((channel_id,)) = channel else {
            tx.rollback().await?;
            return Ok(false);
        };

        let removed = sqlx::query(
            r#"
            DELETE FROM channels
            WHERE id = ?
              AND NOT EXISTS (SELECT 1 FROM targets WHERE channel_id = ?)
            "#,
        )
        .bind(&channel_id)
        .bind(&channel_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        Ok(removed > 0)
    }

    async fn live_channel_names(&self, destination: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT COALESCE(v.last_channel_name, c.display_name, c.platform_id)
            FROM targets t
            JOIN channels c ON c.id = t.channel_id
            JOIN videos v ON v.channel_id = c.id
            WHERE t.destination = ? AND v.state = 'LIVE'
            ORDER BY 1
            "#,
        )
        .bind(destination)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }
}
