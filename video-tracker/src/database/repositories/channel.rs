//! Channel repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::ChannelDbModel;
use crate::{Error, Result};

/// Channel repository trait.
#[async_trait]
pub trait ChannelRepository: Send + Sync {
    async fn get_channel(&self, id: &str) -> Result<ChannelDbModel>;
    async fn get_channel_by_platform_id(&self, platform_id: &str) -> Result<Option<ChannelDbModel>>;
    /// Existing channel for `platform_id`, or a freshly inserted one.
    async fn get_or_create_channel(&self, platform_id: &str) -> Result<ChannelDbModel>;
    async fn list_channels(&self) -> Result<Vec<ChannelDbModel>>;
    /// Delete the channel if no target references it. Returns whether it was removed.
    async fn delete_if_orphaned(&self, id: &str) -> Result<bool>;
}

/// SQLx implementation of ChannelRepository.
pub struct SqlxChannelRepository {
    pool: SqlitePool,
}

impl SqlxChannelRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChannelRepository for SqlxChannelRepository {
    async fn get_channel(&self, id: &str) -> Result<ChannelDbModel> {
        sqlx::query_as::<_, ChannelDbModel>("SELECT * FROM channels WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Channel", id))
    }

    async fn get_channel_by_platform_id(&self, platform_id: &str) -> Result<Option<ChannelDbModel>> {
        let channel =
            sqlx::query_as::<_, ChannelDbModel>("SELECT * FROM channels WHERE platform_id = ?")
                .bind(platform_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(channel)
    }

    async fn get_or_create_channel(&self, platform_id: &str) -> Result<ChannelDbModel> {
        if platform_id.trim().is_empty() {
            return Err(Error::validation("channel id must not be empty"));
        }
        let channel = ChannelDbModel::new(platform_id);
        sqlx::query(
            r#"
            INSERT INTO channels (id, platform_id, display_name, consecutive_error_count, last_error, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(platform_id) DO NOTHING
            "#,
        )
        .bind(&channel.id)
        .bind(&channel.platform_id)
        .bind(&channel.display_name)
        .bind(channel.consecutive_error_count)
        .bind(&channel.last_error)
        .bind(channel.created_at)
        .execute(&self.pool)
        .await?;

        self.get_channel_by_platform_id(platform_id)
            .await?
            .ok_or_else(|| Error::not_found("Channel", platform_id))
    }

    async fn list_channels(&self) -> Result<Vec<ChannelDbModel>> {
        let channels =
            sqlx::query_as::<_, ChannelDbModel>("SELECT * FROM channels ORDER BY platform_id")
                .fetch_all(&self.pool)
                .await?;
        Ok(channels)
    }

    async fn delete_if_orphaned(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM channels
            WHERE id = ?
              AND NOT EXISTS (SELECT 1 FROM targets WHERE channel_id = ?)
            "#,
        )
        .bind(id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::TargetDbModel;
    use crate::database::repositories::{SqlxTargetRepository, TargetRepository};
    use crate::database::{init_pool_with_size, run_migrations};
    use crate::domain::TargetSettings;

    #[tokio::test]
    async fn test_get_or_create_and_orphan_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("t.db").display());
        let pool = init_pool_with_size(&url, 2).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let channels = SqlxChannelRepository::new(pool.clone());
        let first = channels.get_or_create_channel("UC1").await.unwrap();
        let again = channels.get_or_create_channel("UC1").await.unwrap();
        assert_eq!(first.id, again.id);
        assert!(matches!(
            channels.get_or_create_channel(" ").await,
            Err(Error::Validation(_))
        ));

        let target = TargetDbModel::new(&first.id, "dest", &TargetSettings::default()).unwrap();
        SqlxTargetRepository::new(pool.clone())
            .create_target(&target)
            .await
            .unwrap();
        assert!(!channels.delete_if_orphaned(&first.id).await.unwrap());

        sqlx::query("DELETE FROM targets").execute(&pool).await.unwrap();
        assert!(channels.delete_if_orphaned(&first.id).await.unwrap());
        assert!(channels.get_channel_by_platform_id("UC1").await.unwrap().is_none());
    }
}
