//! Notification records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a notification row.
pub type NotificationId = Uuid;

/// Identifier of a user account.
pub type UserId = Uuid;

/// Identifier of a booking.
pub type BookingId = Uuid;

/// Category of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    /// A client asked a photographer for a booking.
    BookingRequest,
    /// The photographer accepted a booking.
    BookingAccepted,
    /// The photographer declined a booking.
    BookingDeclined,
    /// Either party cancelled a booking.
    BookingCancelled,
    /// The photographer delivered the finished work.
    WorkCompleted,
    /// A new chat message arrived on a booking.
    NewMessage,
    /// A payment for a booking was received.
    PaymentReceived,
    /// A client left a review.
    ReviewReceived,
    /// Platform announcement.
    System,
}

impl NotificationType {
    /// Stable string form, matching the serialized representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::BookingRequest => "booking_request",
            NotificationType::BookingAccepted => "booking_accepted",
            NotificationType::BookingDeclined => "booking_declined",
            NotificationType::BookingCancelled => "booking_cancelled",
            NotificationType::WorkCompleted => "work_completed",
            NotificationType::NewMessage => "new_message",
            NotificationType::PaymentReceived => "payment_received",
            NotificationType::ReviewReceived => "review_received",
            NotificationType::System => "system",
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NotificationType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| crate::Error::MalformedPayload(format!("unknown notification type: {s}")))
    }
}

/// A persisted notification addressed to one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    #[serde(default)]
    pub booking_id: Option<BookingId>,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub action_url: Option<String>,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Notification {
    /// Materialize a new, unread notification.
    pub fn create(id: NotificationId, fields: NewNotification, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id: fields.user_id,
            booking_id: fields.booking_id,
            kind: fields.kind,
            title: fields.title,
            message: fields.message,
            action_url: fields.action_url,
            is_read: false,
            created_at: now,
            read_at: None,
            updated_at: now,
        }
    }

    /// Whether `user` owns this notification.
    pub fn is_owned_by(&self, user: &UserId) -> bool {
        &self.user_id == user
    }

    /// Mark the notification as read.
    ///
    /// Returns `false` when it was already read; `read_at` is only ever set
    /// on the first transition and is never cleared.
    pub fn mark_read(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_read {
            return false;
        }
        self.is_read = true;
        if self.read_at.is_none() {
            self.read_at = Some(now);
        }
        self.updated_at = now;
        true
    }
}

/// Fields supplied when creating a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    pub user_id: UserId,
    #[serde(default)]
    pub booking_id: Option<BookingId>,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub action_url: Option<String>,
}

impl NewNotification {
    /// Create notification fields for a user.
    pub fn new(
        user_id: UserId,
        kind: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            booking_id: None,
            kind,
            title: title.into(),
            message: message.into(),
            action_url: None,
        }
    }

    /// Attach the booking that triggered the notification.
    pub fn with_booking(mut self, booking_id: BookingId) -> Self {
        self.booking_id = Some(booking_id);
        self
    }

    /// Attach a link the client should follow when the notification is opened.
    pub fn with_action_url(mut self, url: impl Into<String>) -> Self {
        self.action_url = Some(url.into());
        self
    }
}
