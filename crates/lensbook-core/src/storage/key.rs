//! Secondary index key encoding.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use lensbook_proto::{Notification, NotificationId, UserId};

/// Size of a UUID in bytes.
const ID_SIZE: usize = 16;

/// Size of the timestamp component in bytes.
const TS_SIZE: usize = 8;

/// Total key size.
pub const USER_INDEX_KEY_SIZE: usize = ID_SIZE + TS_SIZE + ID_SIZE;

/// Key of the per-user notification index.
///
/// Key format: `[user_id (16 bytes)][created_at micros (8 bytes, big-endian)][notification_id (16 bytes)]`
///
/// Big-endian encoding makes a prefix scan over one user return notifications
/// in creation order; reversing the scan gives newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserIndexKey {
    pub user_id: UserId,
    pub created_micros: u64,
    pub notification_id: NotificationId,
}

impl UserIndexKey {
    /// Build the index key for a notification.
    pub fn for_notification(notification: &Notification) -> Self {
        Self {
            user_id: notification.user_id,
            created_micros: micros(&notification.created_at),
            notification_id: notification.id,
        }
    }

    /// Encode the key to bytes.
    pub fn encode(&self) -> [u8; USER_INDEX_KEY_SIZE] {
        let mut buf = [0u8; USER_INDEX_KEY_SIZE];
        buf[..ID_SIZE].copy_from_slice(self.user_id.as_bytes());
        buf[ID_SIZE..ID_SIZE + TS_SIZE].copy_from_slice(&self.created_micros.to_be_bytes());
        buf[ID_SIZE + TS_SIZE..].copy_from_slice(self.notification_id.as_bytes());
        buf
    }

    /// Decode a key from bytes.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != USER_INDEX_KEY_SIZE {
            return None;
        }
        let user_id = Uuid::from_slice(&bytes[..ID_SIZE]).ok()?;
        let mut ts = [0u8; TS_SIZE];
        ts.copy_from_slice(&bytes[ID_SIZE..ID_SIZE + TS_SIZE]);
        let notification_id = Uuid::from_slice(&bytes[ID_SIZE + TS_SIZE..]).ok()?;

        Some(Self {
            user_id,
            created_micros: u64::from_be_bytes(ts),
            notification_id,
        })
    }

    /// Prefix shared by every key of one user.
    pub fn user_prefix(user_id: &UserId) -> [u8; ID_SIZE] {
        *user_id.as_bytes()
    }
}

fn micros(ts: &DateTime<Utc>) -> u64 {
    ts.timestamp_micros().max(0) as u64
}
