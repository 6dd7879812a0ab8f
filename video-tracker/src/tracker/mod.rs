//! Polling pipeline: ticker, candidate gatherer, batch caller and
//! transition handlers.

pub mod batch;
pub mod candidates;
pub mod handlers;
pub mod service;
pub mod ticker;

pub use batch::{BatchCaller, ChunkResults};
pub use candidates::{CallReason, CandidateMap, gather_candidates};
pub use handlers::{HandleOutcome, Transition, TransitionHandler};
pub use service::{ItemFailure, TickReport, TransitionCounts, VideoTracker};
pub use ticker::{TickAttempt, Ticker};
