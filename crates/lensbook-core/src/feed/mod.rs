//! Row-level change feed.
//!
//! Consumers subscribe to a table, optionally narrowed to a set of change
//! kinds and a row predicate, and receive each matching [`ChangeRecord`]
//! through a callback. The CDC processor feeds committed store mutations into
//! the in-process implementation.
//!
//! [`ChangeRecord`]: lensbook_proto::ChangeRecord

mod cdc;
mod memory;
mod source;
mod subscription;

pub use cdc::{channel, start_processor, CdcHandle, CdcProcessor, CdcReceiver, CdcSender};
pub use memory::{InMemoryChangeFeed, SharedChangeFeed};
pub use source::{ChangeCallback, ChangeFeed, SubscriptionHandle, SubscriptionRequest};
pub use subscription::SubscriptionEntry;
