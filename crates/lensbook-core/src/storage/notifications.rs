//! Notification store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use tokio::sync::Mutex;
use uuid::Uuid;

use lensbook_proto::{
    BookingId, ChangeRecord, NewNotification, Notification, NotificationId, NotificationType,
    UserId, NOTIFICATIONS_TABLE,
};

use super::key::UserIndexKey;
use crate::error::{Error, Result};
use crate::feed::CdcHandle;

/// Tree name for notification rows.
const NOTIFICATIONS_TREE: &str = "notifications";

/// Tree name for the per-user index.
const USER_INDEX_TREE: &str = "index:user_created";

/// Page size used when a listing does not ask for one.
pub const DEFAULT_LIST_LIMIT: usize = 50;

/// Largest page a listing may request.
pub const MAX_LIST_LIMIT: usize = 500;

/// Filters for listing a user's notifications.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListFilter {
    /// Only unread notifications.
    pub unread_only: bool,
    /// Only notifications about this booking.
    pub booking_id: Option<BookingId>,
    /// Only notifications of this type.
    #[serde(rename = "type")]
    pub kind: Option<NotificationType>,
    /// Maximum number of results.
    pub limit: Option<usize>,
    /// Number of matching results to skip.
    pub offset: Option<usize>,
}

impl ListFilter {
    fn matches(&self, notification: &Notification) -> bool {
        if self.unread_only && notification.is_read {
            return false;
        }
        if let Some(booking_id) = self.booking_id {
            if notification.booking_id != Some(booking_id) {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if notification.kind != kind {
                return false;
            }
        }
        true
    }

    fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT)
    }
}

/// Persistent record of notifications.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Persist a new, unread notification.
    async fn insert(&self, fields: NewNotification) -> Result<Notification>;

    /// Fetch a notification by id.
    async fn get(&self, id: NotificationId) -> Result<Option<Notification>>;

    /// Mark one notification as read on behalf of `actor`.
    ///
    /// Fails with [`Error::Forbidden`] when `actor` is not the owner and with
    /// [`Error::NotFound`] for unknown ids. Marking an already-read
    /// notification returns it unchanged.
    async fn mark_read(&self, id: NotificationId, actor: UserId) -> Result<Notification>;

    /// Mark every unread notification of `user` as read, returning how many changed.
    async fn mark_all_read(&self, user: UserId) -> Result<usize>;

    /// List a user's notifications, newest first.
    async fn list_by_user(&self, user: UserId, filter: &ListFilter) -> Result<Vec<Notification>>;

    /// Count a user's unread notifications, optionally for one booking.
    async fn count_unread(&self, user: UserId, booking_id: Option<BookingId>) -> Result<usize>;

    /// Delete a notification on behalf of its owner.
    async fn delete(&self, id: NotificationId, actor: UserId) -> Result<Notification>;
}

/// Shared notification store handle.
pub type SharedNotificationStore = Arc<dyn NotificationStore>;

/// Notification store backed by sled.
///
/// Writes are serialized so that change records reach the CDC channel in the
/// same order the rows were committed.
pub struct SledNotificationStore {
    /// Notification rows keyed by id.
    rows: Tree,
    /// Per-user index (`user ‖ created_at ‖ id` -> empty).
    user_index: Tree,
    /// CDC sink for committed mutations.
    cdc: Option<CdcHandle>,
    /// Write serialization.
    write_lock: Mutex<()>,
}

impl SledNotificationStore {
    /// Open the notification trees in `db`, publishing changes to `cdc`.
    pub fn open(db: &Db, cdc: CdcHandle) -> Result<Self> {
        Self::open_inner(db, Some(cdc))
    }

    /// Open the notification trees without a change feed.
    pub fn open_detached(db: &Db) -> Result<Self> {
        Self::open_inner(db, None)
    }

    fn open_inner(db: &Db, cdc: Option<CdcHandle>) -> Result<Self> {
        Ok(Self {
            rows: db.open_tree(NOTIFICATIONS_TREE)?,
            user_index: db.open_tree(USER_INDEX_TREE)?,
            cdc,
            write_lock: Mutex::new(()),
        })
    }

    /// Total number of stored notifications.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the store holds no notifications.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn load(&self, id: &NotificationId) -> Result<Option<Notification>> {
        match self.rows.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn load_owned(&self, id: NotificationId, actor: UserId) -> Result<Notification> {
        let notification = self.load(&id)?.ok_or(Error::NotFound(id))?;
        if !notification.is_owned_by(&actor) {
            return Err(Error::Forbidden(id));
        }
        Ok(notification)
    }

    fn save(&self, notification: &Notification) -> Result<()> {
        let value = serde_json::to_vec(notification)?;
        self.rows.insert(notification.id.as_bytes(), value)?;
        Ok(())
    }

    /// Iterate a user's notifications, newest first.
    fn scan_user(&self, user: &UserId) -> impl Iterator<Item = Result<Notification>> + '_ {
        self.user_index
            .scan_prefix(UserIndexKey::user_prefix(user))
            .rev()
            .filter_map(move |item| {
                let key = match item {
                    Ok((key, _)) => key,
                    Err(e) => return Some(Err(Error::from(e))),
                };
                let key = UserIndexKey::decode(&key)?;
                match self.load(&key.notification_id) {
                    Ok(Some(n)) => Some(Ok(n)),
                    // Index entry without a row: the row was deleted mid-scan.
                    Ok(None) => None,
                    Err(e) => Some(Err(e)),
                }
            })
    }

    async fn emit(&self, record: ChangeRecord) {
        let Some(cdc) = &self.cdc else {
            return;
        };
        if let Err(e) = cdc.send(record).await {
            tracing::warn!(
                table = %e.0.table,
                kind = ?e.0.kind,
                "CDC processor unavailable, change record dropped"
            );
        }
    }
}

fn transaction_error(err: TransactionError<()>) -> Error {
    match err {
        TransactionError::Storage(e) => Error::Storage(e),
        TransactionError::Abort(()) => {
            Error::Storage(sled::Error::ReportableBug("transaction aborted".to_string()))
        }
    }
}

#[async_trait]
impl NotificationStore for SledNotificationStore {
    async fn insert(&self, fields: NewNotification) -> Result<Notification> {
        let _guard = self.write_lock.lock().await;

        let notification = Notification::create(Uuid::new_v4(), fields, Utc::now());
        let value = serde_json::to_vec(&notification)?;
        let index_key = UserIndexKey::for_notification(&notification).encode();
        let row_key = notification.id.as_bytes().to_vec();

        (&self.rows, &self.user_index)
            .transaction(|(rows, index)| {
                rows.insert(row_key.as_slice(), value.as_slice())?;
                index.insert(&index_key[..], &b""[..])?;
                Ok::<(), ConflictableTransactionError<()>>(())
            })
            .map_err(transaction_error)?;

        tracing::debug!(
            notification_id = %notification.id,
            user_id = %notification.user_id,
            kind = %notification.kind,
            "notification created"
        );

        self.emit(ChangeRecord::insert(
            NOTIFICATIONS_TABLE,
            serde_json::to_value(&notification)?,
        ))
        .await;

        Ok(notification)
    }

    async fn get(&self, id: NotificationId) -> Result<Option<Notification>> {
        self.load(&id)
    }

    async fn mark_read(&self, id: NotificationId, actor: UserId) -> Result<Notification> {
        let _guard = self.write_lock.lock().await;

        let mut notification = self.load_owned(id, actor)?;
        let before = serde_json::to_value(&notification)?;
        if !notification.mark_read(Utc::now()) {
            return Ok(notification);
        }
        self.save(&notification)?;

        self.emit(ChangeRecord::update(
            NOTIFICATIONS_TABLE,
            before,
            serde_json::to_value(&notification)?,
        ))
        .await;

        Ok(notification)
    }

    async fn mark_all_read(&self, user: UserId) -> Result<usize> {
        let _guard = self.write_lock.lock().await;

        let unread: Vec<Notification> = self
            .scan_user(&user)
            .filter(|n| !matches!(n, Ok(n) if n.is_read))
            .collect::<Result<_>>()?;

        let now = Utc::now();
        let mut updated = 0;
        for mut notification in unread {
            let before = serde_json::to_value(&notification)?;
            if !notification.mark_read(now) {
                continue;
            }
            self.save(&notification)?;
            updated += 1;
            self.emit(ChangeRecord::update(
                NOTIFICATIONS_TABLE,
                before,
                serde_json::to_value(&notification)?,
            ))
            .await;
        }

        tracing::debug!(user_id = %user, updated, "marked all notifications read");
        Ok(updated)
    }

    async fn list_by_user(&self, user: UserId, filter: &ListFilter) -> Result<Vec<Notification>> {
        let mut out = Vec::new();
        let mut skipped = 0;
        let offset = filter.offset.unwrap_or(0);
        let limit = filter.effective_limit();

        for item in self.scan_user(&user) {
            let notification = item?;
            if !filter.matches(&notification) {
                continue;
            }
            if skipped < offset {
                skipped += 1;
                continue;
            }
            if out.len() >= limit {
                break;
            }
            out.push(notification);
        }

        Ok(out)
    }

    async fn count_unread(&self, user: UserId, booking_id: Option<BookingId>) -> Result<usize> {
        let filter = ListFilter {
            unread_only: true,
            booking_id,
            ..Default::default()
        };
        let mut count = 0;
        for item in self.scan_user(&user) {
            if filter.matches(&item?) {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn delete(&self, id: NotificationId, actor: UserId) -> Result<Notification> {
        let _guard = self.write_lock.lock().await;

        let notification = self.load_owned(id, actor)?;
        let index_key = UserIndexKey::for_notification(&notification).encode();
        let row_key = notification.id.as_bytes().to_vec();

        (&self.rows, &self.user_index)
            .transaction(|(rows, index)| {
                rows.remove(row_key.as_slice())?;
                index.remove(&index_key[..])?;
                Ok::<(), ConflictableTransactionError<()>>(())
            })
            .map_err(transaction_error)?;

        tracing::debug!(notification_id = %id, user_id = %actor, "notification deleted");

        self.emit(ChangeRecord::delete(
            NOTIFICATIONS_TABLE,
            serde_json::to_value(&notification)?,
        ))
        .await;

        Ok(notification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{channel, CdcHandle};
    use crate::storage::{Storage, StorageConfig};
    use lensbook_proto::ChangeKind;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, SledNotificationStore) {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(&StorageConfig::new(dir.path())).unwrap();
        let store = SledNotificationStore::open_detached(storage.db()).unwrap();
        (dir, store)
    }

    fn fields(user: UserId, kind: NotificationType) -> NewNotification {
        NewNotification::new(user, kind, "title", "message")
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let (_dir, store) = open_store();
        let user = Uuid::new_v4();

        let created = store
            .insert(fields(user, NotificationType::BookingAccepted))
            .await
            .unwrap();
        assert!(!created.is_read);
        assert!(created.read_at.is_none());

        let loaded = store.get(created.id).await.unwrap().unwrap();
        assert_eq!(loaded, created);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_scoped_to_user() {
        let (_dir, store) = open_store();
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();

        let first = store.insert(fields(user, NotificationType::System)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let second = store.insert(fields(user, NotificationType::System)).await.unwrap();
        store.insert(fields(other, NotificationType::System)).await.unwrap();

        let listed = store.list_by_user(user, &ListFilter::default()).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn test_list_filters_and_paging() {
        let (_dir, store) = open_store();
        let user = Uuid::new_v4();
        let booking = Uuid::new_v4();

        for _ in 0..3 {
            store
                .insert(fields(user, NotificationType::NewMessage).with_booking(booking))
                .await
                .unwrap();
        }
        store.insert(fields(user, NotificationType::System)).await.unwrap();

        let by_booking = ListFilter {
            booking_id: Some(booking),
            ..Default::default()
        };
        assert_eq!(store.list_by_user(user, &by_booking).await.unwrap().len(), 3);

        let by_kind = ListFilter {
            kind: Some(NotificationType::System),
            ..Default::default()
        };
        assert_eq!(store.list_by_user(user, &by_kind).await.unwrap().len(), 1);

        let page = ListFilter {
            limit: Some(2),
            offset: Some(3),
            ..Default::default()
        };
        assert_eq!(store.list_by_user(user, &page).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mark_read_by_owner() {
        let (_dir, store) = open_store();
        let user = Uuid::new_v4();
        let created = store.insert(fields(user, NotificationType::System)).await.unwrap();

        let read = store.mark_read(created.id, user).await.unwrap();
        assert!(read.is_read);
        let first_read_at = read.read_at.unwrap();

        let again = store.mark_read(created.id, user).await.unwrap();
        assert_eq!(again.read_at, Some(first_read_at));
        assert_eq!(store.count_unread(user, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mark_read_by_non_owner_is_forbidden() {
        let (_dir, store) = open_store();
        let owner = Uuid::new_v4();
        let intruder = Uuid::new_v4();
        let created = store.insert(fields(owner, NotificationType::System)).await.unwrap();

        let result = store.mark_read(created.id, intruder).await;
        assert!(matches!(result, Err(Error::Forbidden(id)) if id == created.id));

        let unchanged = store.get(created.id).await.unwrap().unwrap();
        assert!(!unchanged.is_read);
        assert!(unchanged.read_at.is_none());
    }

    #[tokio::test]
    async fn test_mark_read_unknown_is_not_found() {
        let (_dir, store) = open_store();
        let result = store.mark_read(Uuid::new_v4(), Uuid::new_v4()).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_mark_all_read_and_count() {
        let (_dir, store) = open_store();
        let user = Uuid::new_v4();
        let booking = Uuid::new_v4();

        let first = store
            .insert(fields(user, NotificationType::NewMessage).with_booking(booking))
            .await
            .unwrap();
        store.insert(fields(user, NotificationType::System)).await.unwrap();
        store.insert(fields(user, NotificationType::System)).await.unwrap();
        store.mark_read(first.id, user).await.unwrap();

        assert_eq!(store.count_unread(user, None).await.unwrap(), 2);
        assert_eq!(store.count_unread(user, Some(booking)).await.unwrap(), 0);

        assert_eq!(store.mark_all_read(user).await.unwrap(), 2);
        assert_eq!(store.count_unread(user, None).await.unwrap(), 0);
        assert_eq!(store.mark_all_read(user).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_owner_only() {
        let (_dir, store) = open_store();
        let owner = Uuid::new_v4();
        let created = store.insert(fields(owner, NotificationType::System)).await.unwrap();

        assert!(matches!(
            store.delete(created.id, Uuid::new_v4()).await,
            Err(Error::Forbidden(_))
        ));

        store.delete(created.id, owner).await.unwrap();
        assert!(store.get(created.id).await.unwrap().is_none());
        assert!(store.list_by_user(owner, &ListFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mutations_emit_change_records_in_order() {
        let storage = Storage::temporary().unwrap();
        let (tx, mut rx) = channel(16);
        let store = SledNotificationStore::open(storage.db(), CdcHandle::new(tx)).unwrap();
        let user = Uuid::new_v4();

        let created = store.insert(fields(user, NotificationType::System)).await.unwrap();
        store.mark_read(created.id, user).await.unwrap();
        // Second read is a no-op and emits nothing.
        store.mark_read(created.id, user).await.unwrap();
        store.delete(created.id, user).await.unwrap();

        let kinds: Vec<ChangeKind> = (0..3).map(|_| rx.try_recv().unwrap().kind).collect();
        assert_eq!(kinds, vec![ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete]);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let user = Uuid::new_v4();
        let id = {
            let storage = Storage::open(&StorageConfig::new(dir.path())).unwrap();
            let store = SledNotificationStore::open_detached(storage.db()).unwrap();
            let created = store.insert(fields(user, NotificationType::System)).await.unwrap();
            storage.flush().await.unwrap();
            created.id
        };

        let storage = Storage::open(&StorageConfig::new(dir.path())).unwrap();
        let store = SledNotificationStore::open_detached(storage.db()).unwrap();
        assert!(store.get(id).await.unwrap().is_some());
    }
}
