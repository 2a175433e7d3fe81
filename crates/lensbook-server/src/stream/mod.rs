//! Live notification streams.
//!
//! Each connected client gets a [`StreamSession`] that owns its own change-feed
//! subscription and heartbeat. The [`SessionRegistry`] only tracks sessions for
//! limits, listings, and shutdown; events never flow through it.

pub mod dedup;
pub mod event;
pub mod registry;
pub mod session;

pub use dedup::DedupSet;
pub use event::sse_event;
pub use registry::SessionRegistry;
pub use session::{
    CloseReason, Emission, SessionConfig, SessionId, SessionInfo, SessionStream, StreamSession,
};

use lensbook_proto::NotificationId;
use thiserror::Error;

/// Errors raised while opening or feeding a stream session.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The registry is at capacity.
    #[error("too many stream sessions (max: {0})")]
    TooManySessions(usize),

    /// The change feed refused the subscription.
    #[error("subscribe failed: {0}")]
    Subscribe(lensbook_core::Error),

    /// A frame could not be turned into an event.
    #[error("frame encoding failed: {0}")]
    Encode(axum::Error),

    /// A change record did not carry a usable row.
    #[error("malformed change payload: {0}")]
    Payload(lensbook_proto::Error),

    /// A change record belonged to another user.
    #[error("notification {0} belongs to another user")]
    ForeignRow(NotificationId),
}
