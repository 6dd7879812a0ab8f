//! Row models.
//!
//! These map directly to the schema; timestamps are epoch milliseconds and
//! JSON columns stay as strings until a caller asks for the typed view.

pub mod calendar;
pub mod channel;
pub mod notification;
pub mod reminder;
pub mod target;
pub mod video;

pub use calendar::*;
pub use channel::*;
pub use notification::*;
pub use reminder::*;
pub use target::*;
pub use video::*;
