//! Core error types.

use thiserror::Error;

use lensbook_proto::NotificationId;

/// Core errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] lensbook_proto::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Notification not found.
    #[error("notification not found: {0}")]
    NotFound(NotificationId),

    /// The acting user does not own the notification.
    #[error("notification {0} belongs to another user")]
    Forbidden(NotificationId),

    /// Invalid input to a dispatch helper.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Subscription handle is not registered with the feed.
    #[error("subscription {0} not found")]
    SubscriptionNotFound(u64),

    /// Change feed error.
    #[error("change feed error: {0}")]
    ChangeFeed(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
