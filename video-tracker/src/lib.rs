//! Video tracker core.
//!
//! Polls a batched platform metadata API for tracked channels, walks each
//! video through `NEW -> UPCOMING -> LIVE -> ENDED`, and delivers idempotent
//! notifications to every subscribed destination.

pub mod config;
pub mod database;
pub mod domain;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod notifier;
pub mod platform;
pub mod tracker;

pub use config::TrackerConfig;
pub use error::{Error, Result};
