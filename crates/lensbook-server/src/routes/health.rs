use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "lensbook-server",
        "version": env!("CARGO_PKG_VERSION"),
        "streams": {
            "active": state.sessions.session_count(),
            "max": state.sessions.max_sessions(),
            "totalOpened": state.sessions.total_opened(),
        },
        "feed": {
            "subscriptions": state.feed.subscription_count(),
            "callbackErrors": state.feed.callback_errors(),
        }
    }))
}
