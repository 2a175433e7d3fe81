//! Event-stream frames.
//!
//! A frame is one discrete unit pushed to a connected client. The transport
//! decides how frames are written on the wire; this module only names them.

use crate::{Notification, NotificationId};

/// Event name for inserted notifications.
pub const EVENT_NOTIFICATION: &str = "notification";

/// Event name for updated notifications.
pub const EVENT_NOTIFICATION_UPDATE: &str = "notification-update";

/// Event name for deleted notifications.
pub const EVENT_NOTIFICATION_DELETE: &str = "notification-delete";

/// Comment text of a keep-alive frame.
pub const HEARTBEAT_COMMENT: &str = "heartbeat";

/// One discrete unit of the outbound event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Sent once, right after the stream opens.
    Connected,
    /// Comment-only keep-alive.
    Heartbeat,
    /// A notification was created.
    Notification(Box<Notification>),
    /// A notification changed.
    NotificationUpdate(Box<Notification>),
    /// A notification was removed.
    NotificationDelete { notification_id: NotificationId },
}

impl Frame {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Frame::Connected => "connected",
            Frame::Heartbeat => "heartbeat",
            Frame::Notification(_) => EVENT_NOTIFICATION,
            Frame::NotificationUpdate(_) => EVENT_NOTIFICATION_UPDATE,
            Frame::NotificationDelete { .. } => EVENT_NOTIFICATION_DELETE,
        }
    }

    /// Whether the frame carries notification data, as opposed to control frames.
    pub fn is_data(&self) -> bool {
        !matches!(self, Frame::Connected | Frame::Heartbeat)
    }
}
