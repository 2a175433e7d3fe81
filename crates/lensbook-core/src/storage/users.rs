//! User directory.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};

use lensbook_proto::UserId;

use crate::error::Result;

/// Tree name for user records.
const USERS_TREE: &str = "users";

/// Role of an account on the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Client,
    Photographer,
    Admin,
}

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub display_name: String,
    pub role: UserRole,
}

impl User {
    /// Create a user record.
    pub fn new(
        id: UserId,
        email: impl Into<String>,
        display_name: impl Into<String>,
        role: UserRole,
    ) -> Self {
        Self {
            id,
            email: email.into(),
            display_name: display_name.into(),
            role,
        }
    }

    /// Whether the user may access back-office endpoints.
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// Lookup of user records by id.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Fetch a user by id.
    async fn get(&self, id: UserId) -> Result<Option<User>>;
}

/// Shared user directory handle.
pub type SharedUserDirectory = Arc<dyn UserDirectory>;

/// User directory backed by sled.
pub struct SledUserDirectory {
    tree: Tree,
}

impl SledUserDirectory {
    /// Open the user tree in `db`.
    pub fn open(db: &Db) -> Result<Self> {
        Ok(Self {
            tree: db.open_tree(USERS_TREE)?,
        })
    }

    /// Insert or replace a user record.
    pub fn upsert(&self, user: &User) -> Result<()> {
        let value = serde_json::to_vec(user)?;
        self.tree.insert(user.id.as_bytes(), value)?;
        Ok(())
    }

    /// Remove a user record, returning whether it existed.
    pub fn remove(&self, id: &UserId) -> Result<bool> {
        Ok(self.tree.remove(id.as_bytes())?.is_some())
    }

    /// Number of registered users.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Whether no users are registered.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

#[async_trait]
impl UserDirectory for SledUserDirectory {
    async fn get(&self, id: UserId) -> Result<Option<User>> {
        match self.tree.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}
