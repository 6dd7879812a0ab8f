//! Video repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::VideoDbModel;
use crate::domain::VideoStateKind;
use crate::{Error, Result};

/// Video repository trait.
#[async_trait]
pub trait VideoRepository: Send + Sync {
    async fn get_video_by_video_id(&self, video_id: &str) -> Result<Option<VideoDbModel>>;
    /// Start tracking `video_id` as NEW unless it is already known.
    async fn get_or_create_video(&self, video_id: &str, channel_id: &str) -> Result<VideoDbModel>;
    async fn list_videos_by_state(&self, state: VideoStateKind) -> Result<Vec<VideoDbModel>>;
}

/// SQLx implementation of VideoRepository.
pub struct SqlxVideoRepository {
    pool: SqlitePool,
}

impl SqlxVideoRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VideoRepository for SqlxVideoRepository {
    async fn get_video_by_video_id(&self, video_id: &str) -> Result<Option<VideoDbModel>> {
        let video = sqlx::query_as::<_, VideoDbModel>("SELECT * FROM videos WHERE video_id = ?")
            .bind(video_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(video)
    }

    async fn get_or_create_video(&self, video_id: &str, channel_id: &str) -> Result<VideoDbModel> {
        if video_id.trim().is_empty() {
            return Err(Error::validation("video id must not be empty"));
        }
        let video = VideoDbModel::new(video_id, channel_id);
        sqlx::query(
            r#"
            INSERT INTO videos (id, video_id, channel_id, state, api_attempts, member_limited, created_at)
            VALUES (?, ?, ?, ?, 0, 0, ?)
            ON CONFLICT(video_id) DO NOTHING
            "#,
        )
        .bind(&video.id)
        .bind(&video.video_id)
        .bind(&video.channel_id)
        .bind(&video.state)
        .bind(video.created_at)
        .execute(&self.pool)
        .await?;

        self.get_video_by_video_id(video_id)
            .await?
            .ok_or_else(|| Error::not_found("Video", video_id))
    }

    async fn list_videos_by_state(&self, state: VideoStateKind) -> Result<Vec<VideoDbModel>> {
        let videos = sqlx::query_as::<_, VideoDbModel>(
            "SELECT * FROM videos WHERE state = ? ORDER BY created_at",
        )
        .bind(state.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(videos)
    }
}
