//! Domain types: video lifecycle state and per-target settings.

pub mod settings;
pub mod video;

pub use settings::{MentionSettings, NoticeKind, TargetSettings};
pub use video::{LiveStats, Schedule, VideoState, VideoStateKind, next_recheck};
