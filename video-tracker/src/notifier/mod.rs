//! Outbound notices: who gets what, what it says, and what was delivered.

pub mod content;
pub mod events;
pub mod mention;
pub mod service;

pub use events::CalendarManager;
pub use mention::{Mention, MentionContext, resolve_mention};
pub use service::{DeliveryOutcome, DeliveryReport, Notifier, NotifierConfig};
