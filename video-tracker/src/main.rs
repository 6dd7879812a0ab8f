use video_tracker::TrackerConfig;
use video_tracker::database::repositories::{
    ChannelRepository, SqlxChannelRepository, SqlxVideoRepository, VideoRepository,
};
use video_tracker::database::time::now_ms;
use video_tracker::database::{self, GcConfig};
use video_tracker::domain::VideoStateKind;
use video_tracker::logging::{LoggingConfig, init_logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let _log_guard = init_logging(&LoggingConfig::from_env())?;

    let config = TrackerConfig::from_env()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite:video-tracker.db?mode=rwc".to_string());
    let pool = database::init_pool(&database_url).await?;
    database::run_migrations(&pool).await?;

    let report = database::run_gc(&pool, &GcConfig::from(&config), now_ms()).await?;
    tracing::info!(
        expired = report.expired_videos,
        overdue = report.overdue_schedules,
        unresolved = report.unresolved_videos,
        "video-tracker store ready"
    );

    let channels = SqlxChannelRepository::new(pool.clone()).list_channels().await?;
    let videos = SqlxVideoRepository::new(pool.clone());
    let upcoming = videos.list_videos_by_state(VideoStateKind::Upcoming).await?;
    let live = videos.list_videos_by_state(VideoStateKind::Live).await?;
    let failing = channels
        .iter()
        .filter(|c| c.consecutive_error_count > 0)
        .count();
    tracing::info!(
        channels = channels.len(),
        failing,
        upcoming = upcoming.len(),
        live = live.len(),
        "Tracked state"
    );

    pool.close().await;
    Ok(())
}
