//! Logging setup for the process that owns the tracker.
//!
//! Console output always; a daily-rolling file when a log directory is given.
//! Both use local timezone timestamps.

use chrono::Local;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "video_tracker=info,sqlx=warn";

/// File name prefix for the rolling log file.
const LOG_FILE_PREFIX: &str = "video-tracker.log";

#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Logging options.
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub filter: Option<String>,
    /// Directory for rolling log files. Console only when `None`.
    pub log_dir: Option<PathBuf>,
}

impl LoggingConfig {
    /// Read `VIDEO_TRACKER_LOG_DIR` and `VIDEO_TRACKER_LOG_FILTER`.
    pub fn from_env() -> Self {
        let log_dir = std::env::var("VIDEO_TRACKER_LOG_DIR")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);
        let filter = std::env::var("VIDEO_TRACKER_LOG_FILTER")
            .ok()
            .filter(|s| !s.trim().is_empty());
        Self { filter, log_dir }
    }

    fn env_filter(&self) -> crate::Result<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        let directive = self.filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER);
        EnvFilter::try_new(directive)
            .map_err(|e| crate::Error::config(format!("Invalid filter directive: {}", e)))
    }
}

/// Install the global subscriber.
///
/// Returns the file writer guard when file logging is enabled; it must be
/// held for as long as logs should be flushed.
pub fn init_logging(config: &LoggingConfig) -> crate::Result<Option<WorkerGuard>> {
    let filter = config.env_filter()?;

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_timer(LocalTimer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(true).with_timer(LocalTimer))
        .with(file_layer)
        .try_init()
        .map_err(|e| crate::Error::Other(format!("Failed to set global default subscriber: {}", e)))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert!(DEFAULT_LOG_FILTER.contains("video_tracker=info"));
        assert!(DEFAULT_LOG_FILTER.contains("sqlx=warn"));
    }

    #[test]
    fn test_invalid_directive_rejected() {
        let config = LoggingConfig {
            filter: Some("video_tracker=notalevel".to_string()),
            log_dir: None,
        };
        // RUST_LOG takes precedence when set; only assert when it is not.
        if std::env::var("RUST_LOG").is_err() {
            assert!(config.env_filter().is_err());
        }
    }
}
