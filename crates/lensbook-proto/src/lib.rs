//! Lensbook protocol types.
//!
//! This crate defines the data shared between the notification store, the
//! change feed, and the event-stream transport.
//!
//! # Modules
//!
//! - [`notification`] - Persisted notification records and their categories
//! - [`change`] - Row-level change records emitted by the change feed
//! - [`frame`] - Event-stream frames pushed to connected clients
//! - [`error`] - Protocol error types

pub mod change;
pub mod error;
pub mod frame;
pub mod notification;

pub use error::Error;

pub use change::{ChangeKind, ChangeRecord, RowFilter, NOTIFICATIONS_TABLE};
pub use frame::{
    Frame, EVENT_NOTIFICATION, EVENT_NOTIFICATION_DELETE, EVENT_NOTIFICATION_UPDATE,
    HEARTBEAT_COMMENT,
};
pub use notification::{
    BookingId, NewNotification, Notification, NotificationId, NotificationType, UserId,
};
