//! Lensbook Core - notification storage, change feed, and dispatch.
//!
//! This crate provides the persistent side of notification delivery:
//! - [`storage`] - sled-backed notification store and user directory
//! - [`feed`] - row-level change feed with filtered subscriptions
//! - [`dispatch`] - helpers that turn domain events into notifications
//!
//! Stores never talk to connected clients. Every committed mutation is handed
//! to the CDC processor, which publishes it on the change feed; stream sessions
//! subscribe to the feed on their own.

pub mod dispatch;
pub mod error;
pub mod feed;
pub mod storage;

pub use dispatch::{BookingParties, NotificationDispatcher};
pub use error::{Error, Result};
pub use feed::{
    start_processor, CdcHandle, CdcProcessor, ChangeCallback, ChangeFeed, InMemoryChangeFeed,
    SubscriptionHandle, SubscriptionRequest,
};
pub use storage::{
    ListFilter, NotificationStore, SharedNotificationStore, SharedUserDirectory,
    SledNotificationStore, SledUserDirectory, Storage, StorageConfig, User, UserDirectory,
    UserRole,
};

/// Re-export protocol types.
pub use lensbook_proto as proto;
