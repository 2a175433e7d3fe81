//! Back-office endpoints.
//!
//! Event ingestion lets the rest of the marketplace report domain events over
//! HTTP; each event becomes exactly one notification through the dispatcher.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use lensbook_core::BookingParties;
use lensbook_proto::{BookingId, NewNotification, Notification, NotificationType, UserId};

use crate::auth::AdminUser;
use crate::error::Result;
use crate::state::AppState;
use crate::stream::SessionInfo;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/stream-sessions", get(list_stream_sessions))
        .route("/api/admin/events", post(ingest_event))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StreamSessionList {
    active: usize,
    max: usize,
    sessions: Vec<SessionInfo>,
}

async fn list_stream_sessions(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> Json<StreamSessionList> {
    Json(StreamSessionList {
        active: state.sessions.session_count(),
        max: state.sessions.max_sessions(),
        sessions: state.sessions.list_sessions(),
    })
}

/// Booking participants as sent by the caller.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRef {
    pub booking_id: BookingId,
    pub client_id: UserId,
    pub client_name: String,
    pub photographer_id: UserId,
    pub photographer_name: String,
}

impl From<BookingRef> for BookingParties {
    fn from(booking: BookingRef) -> Self {
        BookingParties {
            booking_id: booking.booking_id,
            client_id: booking.client_id,
            client_name: booking.client_name,
            photographer_id: booking.photographer_id,
            photographer_name: booking.photographer_name,
        }
    }
}

/// A marketplace event that results in a notification.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum DomainEvent {
    BookingRequested { booking: BookingRef, service: String },
    BookingAccepted { booking: BookingRef },
    BookingDeclined { booking: BookingRef, reason: Option<String> },
    BookingCancelled { booking: BookingRef, cancelled_by: UserId },
    WorkCompleted { booking: BookingRef },
    NewMessage { booking: BookingRef, sender_id: UserId, body: String },
    PaymentReceived { booking: BookingRef, amount_cents: u64, currency: String },
    ReviewReceived { booking: BookingRef, rating: u8 },
    System {
        user_id: UserId,
        title: String,
        message: String,
        action_url: Option<String>,
    },
}

async fn ingest_event(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(event): Json<DomainEvent>,
) -> Result<(StatusCode, Json<Notification>)> {
    let dispatcher = &state.dispatcher;
    let notification = match event {
        DomainEvent::BookingRequested { booking, service } => {
            dispatcher.booking_requested(&booking.into(), &service).await?
        }
        DomainEvent::BookingAccepted { booking } => {
            dispatcher.booking_accepted(&booking.into()).await?
        }
        DomainEvent::BookingDeclined { booking, reason } => {
            dispatcher
                .booking_declined(&booking.into(), reason.as_deref())
                .await?
        }
        DomainEvent::BookingCancelled {
            booking,
            cancelled_by,
        } => {
            dispatcher
                .booking_cancelled(&booking.into(), cancelled_by)
                .await?
        }
        DomainEvent::WorkCompleted { booking } => dispatcher.work_completed(&booking.into()).await?,
        DomainEvent::NewMessage {
            booking,
            sender_id,
            body,
        } => dispatcher.new_message(&booking.into(), sender_id, &body).await?,
        DomainEvent::PaymentReceived {
            booking,
            amount_cents,
            currency,
        } => {
            dispatcher
                .payment_received(&booking.into(), amount_cents, &currency)
                .await?
        }
        DomainEvent::ReviewReceived { booking, rating } => {
            dispatcher.review_received(&booking.into(), rating).await?
        }
        DomainEvent::System {
            user_id,
            title,
            message,
            action_url,
        } => {
            let mut fields = NewNotification::new(user_id, NotificationType::System, title, message);
            if let Some(url) = action_url {
                fields = fields.with_action_url(url);
            }
            state.store.insert(fields).await?
        }
    };

    tracing::debug!(
        admin_id = %admin.id,
        notification_id = %notification.id,
        kind = %notification.kind,
        "ingested domain event"
    );
    Ok((StatusCode::CREATED, Json(notification)))
}
