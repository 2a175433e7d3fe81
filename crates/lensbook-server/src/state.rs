use std::sync::Arc;

use lensbook_core::{
    start_processor, InMemoryChangeFeed, NotificationDispatcher, SharedNotificationStore,
    SharedUserDirectory, SledNotificationStore, SledUserDirectory, Storage,
};

use crate::auth::JwtAuthenticator;
use crate::config::ServerConfig;
use crate::stream::SessionRegistry;

/// Application state shared across all routes
#[derive(Clone)]
pub struct AppState {
    pub store: SharedNotificationStore,
    pub users: SharedUserDirectory,
    pub feed: Arc<InMemoryChangeFeed>,
    pub sessions: Arc<SessionRegistry>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub auth: Arc<JwtAuthenticator>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(
        store: SharedNotificationStore,
        users: SharedUserDirectory,
        feed: Arc<InMemoryChangeFeed>,
        auth: JwtAuthenticator,
        config: ServerConfig,
    ) -> Self {
        Self {
            dispatcher: Arc::new(NotificationDispatcher::new(store.clone())),
            sessions: Arc::new(SessionRegistry::new(config.max_sessions)),
            store,
            users,
            feed,
            auth: Arc::new(auth),
            config: Arc::new(config),
        }
    }
}

/// Everything the server runs on, wired together.
pub struct Services {
    pub state: AppState,
    pub storage: Storage,
    /// Concrete directory, for seeding users.
    pub directory: Arc<SledUserDirectory>,
}

impl Services {
    /// Open storage and start the change-capture pipeline.
    ///
    /// Must be called inside a tokio runtime.
    pub fn open(
        storage: Storage,
        auth: JwtAuthenticator,
        config: ServerConfig,
    ) -> lensbook_core::Result<Self> {
        let feed = Arc::new(InMemoryChangeFeed::new());
        let cdc = start_processor(feed.clone(), config.cdc_buffer);

        let store: SharedNotificationStore =
            Arc::new(SledNotificationStore::open(storage.db(), cdc)?);
        let directory = Arc::new(SledUserDirectory::open(storage.db())?);
        let users: SharedUserDirectory = directory.clone();

        Ok(Self {
            state: AppState::new(store, users, feed, auth, config),
            storage,
            directory,
        })
    }
}
