//! Notification dispatch helpers.
//!
//! Each helper maps one domain event to exactly one persisted notification for
//! the right recipient. Helpers know nothing about connected clients: delivery
//! happens through the change feed once the row is committed. Storage errors
//! are returned to the caller as-is; there are no retries here.

use lensbook_proto::{
    BookingId, NewNotification, Notification, NotificationType, UserId,
};

use crate::error::{Error, Result};
use crate::storage::SharedNotificationStore;

/// Longest message preview copied into a notification.
pub const MESSAGE_PREVIEW_CHARS: usize = 100;

/// The two parties of a booking, with display names for templating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingParties {
    pub booking_id: BookingId,
    pub client_id: UserId,
    pub client_name: String,
    pub photographer_id: UserId,
    pub photographer_name: String,
}

impl BookingParties {
    /// The party on the other side of `user`, if `user` is part of the booking.
    fn counterpart_of(&self, user: &UserId) -> Result<(UserId, &str)> {
        if user == &self.client_id {
            Ok((self.photographer_id, self.client_name.as_str()))
        } else if user == &self.photographer_id {
            Ok((self.client_id, self.photographer_name.as_str()))
        } else {
            Err(Error::InvalidInput(format!(
                "user {user} is not a party of booking {}",
                self.booking_id
            )))
        }
    }

    fn booking_url(&self) -> String {
        format!("/bookings/{}", self.booking_id)
    }
}

/// Creates notifications in response to marketplace events.
#[derive(Clone)]
pub struct NotificationDispatcher {
    store: SharedNotificationStore,
}

impl NotificationDispatcher {
    /// Create a dispatcher writing to `store`.
    pub fn new(store: SharedNotificationStore) -> Self {
        Self { store }
    }

    /// A client requested a session; tell the photographer.
    pub async fn booking_requested(
        &self,
        parties: &BookingParties,
        service: &str,
    ) -> Result<Notification> {
        self.persist(
            NewNotification::new(
                parties.photographer_id,
                NotificationType::BookingRequest,
                "New booking request",
                format!("{} requested a {} session.", parties.client_name, service),
            )
            .with_booking(parties.booking_id)
            .with_action_url(parties.booking_url()),
        )
        .await
    }

    /// The photographer accepted; tell the client.
    pub async fn booking_accepted(&self, parties: &BookingParties) -> Result<Notification> {
        self.persist(
            NewNotification::new(
                parties.client_id,
                NotificationType::BookingAccepted,
                "Booking accepted",
                format!("{} accepted your booking.", parties.photographer_name),
            )
            .with_booking(parties.booking_id)
            .with_action_url(parties.booking_url()),
        )
        .await
    }

    /// The photographer declined; tell the client.
    pub async fn booking_declined(
        &self,
        parties: &BookingParties,
        reason: Option<&str>,
    ) -> Result<Notification> {
        let message = match reason.map(str::trim).filter(|r| !r.is_empty()) {
            Some(reason) => format!(
                "{} declined your booking: {}",
                parties.photographer_name, reason
            ),
            None => format!("{} declined your booking.", parties.photographer_name),
        };

        self.persist(
            NewNotification::new(
                parties.client_id,
                NotificationType::BookingDeclined,
                "Booking declined",
                message,
            )
            .with_booking(parties.booking_id)
            .with_action_url(parties.booking_url()),
        )
        .await
    }

    /// One party cancelled; tell the other one.
    pub async fn booking_cancelled(
        &self,
        parties: &BookingParties,
        cancelled_by: UserId,
    ) -> Result<Notification> {
        let (recipient, actor_name) = parties.counterpart_of(&cancelled_by)?;

        self.persist(
            NewNotification::new(
                recipient,
                NotificationType::BookingCancelled,
                "Booking cancelled",
                format!("{actor_name} cancelled the booking."),
            )
            .with_booking(parties.booking_id)
            .with_action_url(parties.booking_url()),
        )
        .await
    }

    /// The photographer delivered the work; tell the client.
    pub async fn work_completed(&self, parties: &BookingParties) -> Result<Notification> {
        self.persist(
            NewNotification::new(
                parties.client_id,
                NotificationType::WorkCompleted,
                "Your photos are ready",
                format!(
                    "{} marked your booking as completed. Your gallery is ready to view.",
                    parties.photographer_name
                ),
            )
            .with_booking(parties.booking_id)
            .with_action_url(parties.booking_url()),
        )
        .await
    }

    /// A chat message was sent on a booking; tell the recipient.
    pub async fn new_message(
        &self,
        parties: &BookingParties,
        sender: UserId,
        body: &str,
    ) -> Result<Notification> {
        let (recipient, sender_name) = parties.counterpart_of(&sender)?;

        self.persist(
            NewNotification::new(
                recipient,
                NotificationType::NewMessage,
                format!("New message from {sender_name}"),
                preview(body),
            )
            .with_booking(parties.booking_id)
            .with_action_url(format!("{}/messages", parties.booking_url())),
        )
        .await
    }

    /// A payment cleared; tell the photographer.
    pub async fn payment_received(
        &self,
        parties: &BookingParties,
        amount_cents: u64,
        currency: &str,
    ) -> Result<Notification> {
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(Error::InvalidInput(format!("invalid currency code: {currency}")));
        }

        self.persist(
            NewNotification::new(
                parties.photographer_id,
                NotificationType::PaymentReceived,
                "Payment received",
                format!(
                    "{} paid {}.{:02} {} for the booking.",
                    parties.client_name,
                    amount_cents / 100,
                    amount_cents % 100,
                    currency.to_ascii_uppercase()
                ),
            )
            .with_booking(parties.booking_id)
            .with_action_url(parties.booking_url()),
        )
        .await
    }

    /// A client reviewed the session; tell the photographer.
    pub async fn review_received(
        &self,
        parties: &BookingParties,
        rating: u8,
    ) -> Result<Notification> {
        if !(1..=5).contains(&rating) {
            return Err(Error::InvalidInput(format!("rating must be 1-5, got {rating}")));
        }

        self.persist(
            NewNotification::new(
                parties.photographer_id,
                NotificationType::ReviewReceived,
                "New review",
                format!("{} left you a {}-star review.", parties.client_name, rating),
            )
            .with_booking(parties.booking_id)
            .with_action_url(format!("{}/review", parties.booking_url())),
        )
        .await
    }

    async fn persist(&self, fields: NewNotification) -> Result<Notification> {
        let notification = self.store.insert(fields).await?;
        tracing::info!(
            notification_id = %notification.id,
            user_id = %notification.user_id,
            kind = %notification.kind,
            "notification dispatched"
        );
        Ok(notification)
    }
}

fn preview(body: &str) -> String {
    let body = body.trim();
    let mut chars = body.chars();
    let head: String = chars.by_ref().take(MESSAGE_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ListFilter, NotificationStore, SledNotificationStore, Storage};
    use async_trait::async_trait;
    use lensbook_proto::{BookingId, NotificationId};
    use std::sync::Arc;
    use uuid::Uuid;

    fn parties() -> BookingParties {
        BookingParties {
            booking_id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            client_name: "Casey".to_string(),
            photographer_id: Uuid::new_v4(),
            photographer_name: "Priya".to_string(),
        }
    }

    fn dispatcher() -> (Arc<SledNotificationStore>, NotificationDispatcher) {
        let storage = Storage::temporary().unwrap();
        let store = Arc::new(SledNotificationStore::open_detached(storage.db()).unwrap());
        let dispatcher = NotificationDispatcher::new(store.clone());
        (store, dispatcher)
    }

    #[tokio::test]
    async fn test_booking_accepted_goes_to_client() {
        let (store, dispatcher) = dispatcher();
        let parties = parties();

        let n = dispatcher.booking_accepted(&parties).await.unwrap();
        assert_eq!(n.user_id, parties.client_id);
        assert_eq!(n.kind, NotificationType::BookingAccepted);
        assert_eq!(n.booking_id, Some(parties.booking_id));
        assert_eq!(n.message, "Priya accepted your booking.");
        assert_eq!(n.action_url, Some(format!("/bookings/{}", parties.booking_id)));
        assert!(!n.is_read);

        let listed = store
            .list_by_user(parties.client_id, &ListFilter::default())
            .await
            .unwrap();
        assert_eq!(listed, vec![n]);
    }

    #[tokio::test]
    async fn test_booking_requested_goes_to_photographer() {
        let (_store, dispatcher) = dispatcher();
        let parties = parties();

        let n = dispatcher.booking_requested(&parties, "wedding").await.unwrap();
        assert_eq!(n.user_id, parties.photographer_id);
        assert_eq!(n.message, "Casey requested a wedding session.");
    }

    #[tokio::test]
    async fn test_cancel_notifies_other_party() {
        let (_store, dispatcher) = dispatcher();
        let parties = parties();

        let n = dispatcher
            .booking_cancelled(&parties, parties.client_id)
            .await
            .unwrap();
        assert_eq!(n.user_id, parties.photographer_id);
        assert_eq!(n.message, "Casey cancelled the booking.");

        let n = dispatcher
            .booking_cancelled(&parties, parties.photographer_id)
            .await
            .unwrap();
        assert_eq!(n.user_id, parties.client_id);

        let outsider = dispatcher.booking_cancelled(&parties, Uuid::new_v4()).await;
        assert!(matches!(outsider, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_declined_with_and_without_reason() {
        let (_store, dispatcher) = dispatcher();
        let parties = parties();

        let n = dispatcher.booking_declined(&parties, Some("fully booked")).await.unwrap();
        assert_eq!(n.message, "Priya declined your booking: fully booked");

        let n = dispatcher.booking_declined(&parties, Some("  ")).await.unwrap();
        assert_eq!(n.message, "Priya declined your booking.");
    }

    #[tokio::test]
    async fn test_new_message_preview_is_truncated() {
        let (_store, dispatcher) = dispatcher();
        let parties = parties();
        let long = "x".repeat(MESSAGE_PREVIEW_CHARS + 20);

        let n = dispatcher
            .new_message(&parties, parties.photographer_id, &long)
            .await
            .unwrap();
        assert_eq!(n.user_id, parties.client_id);
        assert_eq!(n.title, "New message from Priya");
        assert_eq!(n.message.chars().count(), MESSAGE_PREVIEW_CHARS + 1);
        assert!(n.action_url.unwrap().ends_with("/messages"));
    }

    #[tokio::test]
    async fn test_payment_and_review_validation() {
        let (_store, dispatcher) = dispatcher();
        let parties = parties();

        let n = dispatcher.payment_received(&parties, 25_050, "usd").await.unwrap();
        assert_eq!(n.message, "Casey paid 250.50 USD for the booking.");
        assert!(dispatcher.payment_received(&parties, 1, "dollars").await.is_err());

        let n = dispatcher.review_received(&parties, 5).await.unwrap();
        assert_eq!(n.kind, NotificationType::ReviewReceived);
        assert!(dispatcher.review_received(&parties, 0).await.is_err());
        assert!(dispatcher.review_received(&parties, 6).await.is_err());
    }

    struct FailingStore;

    #[async_trait]
    impl NotificationStore for FailingStore {
        async fn insert(&self, _fields: NewNotification) -> Result<Notification> {
            Err(Error::Storage(sled::Error::Unsupported("disk full".into())))
        }
        async fn get(&self, _id: NotificationId) -> Result<Option<Notification>> {
            Ok(None)
        }
        async fn mark_read(&self, id: NotificationId, _actor: UserId) -> Result<Notification> {
            Err(Error::NotFound(id))
        }
        async fn mark_all_read(&self, _user: UserId) -> Result<usize> {
            Ok(0)
        }
        async fn list_by_user(&self, _user: UserId, _filter: &ListFilter) -> Result<Vec<Notification>> {
            Ok(Vec::new())
        }
        async fn count_unread(&self, _user: UserId, _booking: Option<BookingId>) -> Result<usize> {
            Ok(0)
        }
        async fn delete(&self, id: NotificationId, _actor: UserId) -> Result<Notification> {
            Err(Error::NotFound(id))
        }
    }

    #[tokio::test]
    async fn test_storage_failure_is_propagated() {
        let dispatcher = NotificationDispatcher::new(Arc::new(FailingStore));
        let result = dispatcher.work_completed(&parties()).await;
        assert!(matches!(result, Err(Error::Storage(_))));
    }
}
