//! Shared fixtures for the HTTP tests.

#![allow(dead_code)]

pub mod sse;

use std::collections::VecDeque;
use std::time::Duration;

use axum::body::BodyDataStream;
use axum::http::HeaderValue;
use futures::StreamExt;
use uuid::Uuid;

use lensbook_core::{Storage, StorageConfig, User, UserRole};
use lensbook_server::auth::JwtAuthenticator;
use lensbook_server::{create_router, AppState, ServerConfig, Services};

pub use sse::RawEvent;

pub const SECRET: &str = "integration-test-secret";

pub struct TestContext {
    pub services: Services,
    _storage_dir: tempfile::TempDir,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        let storage_dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(&StorageConfig::new(storage_dir.path())).unwrap();
        let services =
            Services::open(storage, JwtAuthenticator::with_secret_str(SECRET), config).unwrap();

        Self {
            services,
            _storage_dir: storage_dir,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.services.state
    }

    pub fn router(&self) -> axum::Router {
        create_router(self.services.state.clone())
    }

    /// Register a user and mint a token for them.
    pub fn user(&self, name: &str, role: UserRole) -> (User, String) {
        let user = User::new(Uuid::new_v4(), format!("{name}@example.com"), name, role);
        self.services.directory.upsert(&user).unwrap();
        let token = self.services.state.auth.issue(user.id, 3600).unwrap();
        (user, token)
    }
}

pub fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {token}")).unwrap()
}

/// Reads event-stream blocks off a response body.
pub struct EventReader {
    body: BodyDataStream,
    buffer: String,
    pending: VecDeque<RawEvent>,
}

impl EventReader {
    pub fn new(body: axum::body::Body) -> Self {
        Self {
            body: body.into_data_stream(),
            buffer: String::new(),
            pending: VecDeque::new(),
        }
    }

    /// Next event, or `None` if the stream ended or stayed quiet for `wait`.
    pub async fn next_within(&mut self, wait: Duration) -> Option<RawEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            let chunk = tokio::time::timeout(wait, self.body.next()).await.ok()??;
            let chunk = chunk.unwrap();
            self.buffer.push_str(std::str::from_utf8(&chunk).unwrap());
            let (events, rest) = RawEvent::split(&self.buffer)
                .unwrap_or_else(|e| panic!("malformed event stream: {e}"));
            self.buffer = rest;
            self.pending.extend(events);
        }
    }

    pub async fn next(&mut self) -> RawEvent {
        self.next_within(Duration::from_secs(2))
            .await
            .expect("expected an event")
    }

    /// Whether the body has ended.
    pub async fn is_finished(&mut self) -> bool {
        matches!(
            tokio::time::timeout(Duration::from_secs(2), self.body.next()).await,
            Ok(None)
        )
    }
}
