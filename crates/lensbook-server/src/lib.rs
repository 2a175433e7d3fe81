//! Lensbook Server - real-time notification delivery over HTTP.
//!
//! This crate serves the notification API for the marketplace:
//! - Live per-user event streams (`text/event-stream`)
//! - Notification listing, unread counts, and read/delete operations
//! - Health and back-office endpoints
//!
//! Persistence and change capture live in `lensbook-core`; this crate owns the
//! connection side: authentication, stream sessions, and the session registry.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod stream;

use axum::Router;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use config::{Args, ServerConfig};
pub use error::AppError;
pub use state::{AppState, Services};

/// Create the Axum router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .merge(routes::health::routes())
        // Live stream
        .merge(routes::stream::routes())
        // REST API
        .merge(routes::notifications::routes())
        // Back office
        .merge(routes::admin::routes())
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
