use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Sse},
    routing::get,
    Router,
};

use crate::auth::AuthUser;
use crate::error::Result;
use crate::state::AppState;
use crate::stream::StreamSession;

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/notifications/stream", get(notification_stream))
}

/// Open the caller's live notification stream.
///
/// Authentication happens in the extractor, so a rejected request never sees
/// a partial stream. Heartbeats come from the session, not from `KeepAlive`.
async fn notification_stream(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse> {
    let stream = StreamSession::open(
        user.id,
        state.feed.clone(),
        &state.sessions,
        &state.config.session,
    )?;

    Ok((
        [
            (header::CACHE_CONTROL, "no-cache, no-transform"),
            (header::CONNECTION, "keep-alive"),
            (header::HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Sse::new(stream),
    ))
}
