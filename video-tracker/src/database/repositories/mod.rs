//! Repository layer for database access.
//!
//! Pool-level repositories sit behind `async_trait` traits so services can
//! be handed any implementation. `*TxOps` types run inside a caller-owned
//! transaction.

pub mod calendar;
pub mod channel;
pub mod channel_tx;
pub mod notification;
pub mod reminder;
pub mod target;
pub mod video;
pub mod video_tx;

pub use calendar::*;
pub use channel::*;
pub use channel_tx::*;
pub use notification::*;
pub use reminder::*;
pub use target::*;
pub use video::*;
pub use video_tx::*;
