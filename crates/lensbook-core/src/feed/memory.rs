//! In-process change feed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use lensbook_proto::ChangeRecord;

use super::source::{ChangeCallback, ChangeFeed, SubscriptionHandle, SubscriptionRequest};
use super::subscription::SubscriptionEntry;
use crate::error::{Error, Result};

/// Change feed that dispatches published records to in-process subscribers.
///
/// Callbacks are invoked outside the internal locks, so a callback may
/// subscribe or unsubscribe without deadlocking the feed.
pub struct InMemoryChangeFeed {
    /// Active subscriptions keyed by subscription ID.
    subscriptions: RwLock<HashMap<u64, Arc<SubscriptionEntry>>>,
    /// Index of subscriptions by table.
    table_index: RwLock<HashMap<String, Vec<u64>>>,
    /// Next subscription ID.
    next_subscription_id: AtomicU64,
    /// Total callback failures.
    callback_errors: AtomicU64,
}

impl InMemoryChangeFeed {
    /// Create an empty change feed.
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            table_index: RwLock::new(HashMap::new()),
            next_subscription_id: AtomicU64::new(1),
            callback_errors: AtomicU64::new(0),
        }
    }

    /// Publish a change record to every matching subscription.
    ///
    /// Returns the number of subscriptions the record was delivered to.
    pub fn publish(&self, record: &ChangeRecord) -> usize {
        let targets: Vec<Arc<SubscriptionEntry>> = {
            let index = self.table_index.read();
            let Some(ids) = index.get(&record.table) else {
                return 0;
            };
            let subs = self.subscriptions.read();
            ids.iter()
                .filter_map(|id| subs.get(id))
                .filter(|entry| entry.request.accepts(record))
                .cloned()
                .collect()
        };

        let mut delivered = 0;
        for entry in targets {
            match (entry.callback)(record) {
                Ok(()) => {
                    entry.record_delivery();
                    delivered += 1;
                }
                Err(e) => {
                    self.callback_errors.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        subscription_id = entry.id,
                        table = %record.table,
                        kind = ?record.kind,
                        error = %e,
                        "change feed callback failed"
                    );
                }
            }
        }

        tracing::trace!(
            table = %record.table,
            kind = ?record.kind,
            delivered,
            "published change record"
        );

        delivered
    }

    /// Get the number of active subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Get subscription IDs for a table.
    pub fn subscriptions_for_table(&self, table: &str) -> Vec<u64> {
        self.table_index.read().get(table).cloned().unwrap_or_default()
    }

    /// Number of callback failures observed since startup.
    pub fn callback_errors(&self) -> u64 {
        self.callback_errors.load(Ordering::Relaxed)
    }
}

impl Default for InMemoryChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed for InMemoryChangeFeed {
    fn subscribe(
        &self,
        request: SubscriptionRequest,
        callback: ChangeCallback,
    ) -> Result<SubscriptionHandle> {
        let id = self.next_subscription_id.fetch_add(1, Ordering::SeqCst);
        let table = request.table.clone();

        // Entry goes in before the index so publish never sees a dangling id.
        self.subscriptions
            .write()
            .insert(id, Arc::new(SubscriptionEntry::new(id, request, callback)));
        self.table_index.write().entry(table.clone()).or_default().push(id);

        tracing::debug!(subscription_id = id, table = %table, "subscription created");

        Ok(SubscriptionHandle { id, table })
    }

    fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<()> {
        let entry = self
            .subscriptions
            .write()
            .remove(&handle.id)
            .ok_or(Error::SubscriptionNotFound(handle.id))?;

        {
            let mut index = self.table_index.write();
            if let Some(ids) = index.get_mut(&entry.request.table) {
                ids.retain(|&id| id != handle.id);
                if ids.is_empty() {
                    index.remove(&entry.request.table);
                }
            }
        }

        tracing::debug!(
            subscription_id = handle.id,
            table = %entry.request.table,
            events_delivered = entry.events_delivered(),
            age_ms = entry.age().as_millis() as u64,
            "subscription removed"
        );

        Ok(())
    }
}

/// Shared change feed handle.
pub type SharedChangeFeed = Arc<InMemoryChangeFeed>;
