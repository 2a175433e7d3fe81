use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use lensbook_core::ListFilter;
use lensbook_proto::{BookingId, Notification, NotificationId};

use crate::auth::AuthUser;
use crate::error::Result;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/unread-count", get(unread_count))
        .route("/api/notifications/read-all", post(mark_all_read))
        .route("/api/notifications/:id/read", post(mark_read))
        .route("/api/notifications/:id", delete(delete_notification))
}

#[derive(Serialize)]
struct NotificationList {
    notifications: Vec<Notification>,
}

async fn list_notifications(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(filter): Query<ListFilter>,
) -> Result<Json<NotificationList>> {
    let notifications = state.store.list_by_user(user.id, &filter).await?;
    Ok(Json(NotificationList { notifications }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct UnreadCountQuery {
    booking_id: Option<BookingId>,
}

async fn unread_count(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<UnreadCountQuery>,
) -> Result<Json<Value>> {
    let count = state.store.count_unread(user.id, query.booking_id).await?;
    Ok(Json(json!({ "count": count })))
}

async fn mark_read(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<NotificationId>,
) -> Result<Json<Notification>> {
    let notification = state.store.mark_read(id, user.id).await?;
    Ok(Json(notification))
}

async fn mark_all_read(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Value>> {
    let updated = state.store.mark_all_read(user.id).await?;
    tracing::debug!(user_id = %user.id, updated, "marked all notifications read");
    Ok(Json(json!({ "updated": updated })))
}

async fn delete_notification(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<NotificationId>,
) -> Result<StatusCode> {
    state.store.delete(id, user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
