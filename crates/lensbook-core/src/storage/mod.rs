//! Storage layer for Lensbook.
//!
//! This module provides sled-backed persistence for notifications and users.
//! Both stores share one [`Storage`] database and live in separate trees.

mod config;
mod key;
mod notifications;
mod users;

pub use config::StorageConfig;
pub use key::UserIndexKey;
pub use notifications::{
    ListFilter, NotificationStore, SharedNotificationStore, SledNotificationStore,
    DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT,
};
pub use users::{SharedUserDirectory, SledUserDirectory, User, UserDirectory, UserRole};

use sled::Db;

use crate::error::Result;

/// Handle to the underlying sled database.
#[derive(Clone)]
pub struct Storage {
    db: Db,
}

impl Storage {
    /// Open or create the database described by `config`.
    pub fn open(config: &StorageConfig) -> Result<Self> {
        let db = config.to_sled_config().open()?;
        if db.was_recovered() {
            tracing::debug!(path = %config.path.display(), "storage recovered from existing data");
        }
        Ok(Self { db })
    }

    /// Open a throwaway database for tests and demos.
    pub fn temporary() -> Result<Self> {
        Self::open(&StorageConfig::temporary())
    }

    /// Get the sled database.
    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Flush dirty pages to disk.
    pub async fn flush(&self) -> Result<usize> {
        Ok(self.db.flush_async().await?)
    }
}
