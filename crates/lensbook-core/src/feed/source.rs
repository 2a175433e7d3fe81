//! Change feed capability.

use std::sync::Arc;

use lensbook_proto::{ChangeKind, ChangeRecord, RowFilter};

use crate::error::Result;

/// Callback invoked for every matching change.
///
/// Callbacks run on the publisher's task and must not block.
pub type ChangeCallback = Arc<dyn Fn(&ChangeRecord) -> Result<()> + Send + Sync>;

/// What a subscriber wants to observe.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionRequest {
    /// Table to watch.
    pub table: String,
    /// Change kinds to deliver.
    pub kinds: Vec<ChangeKind>,
    /// Row predicate.
    pub filter: RowFilter,
}

impl SubscriptionRequest {
    /// Watch every change on a table.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            kinds: ChangeKind::ALL.to_vec(),
            filter: RowFilter::All,
        }
    }

    /// Restrict delivery to the given change kinds.
    pub fn with_kinds(mut self, kinds: &[ChangeKind]) -> Self {
        self.kinds = kinds.to_vec();
        self
    }

    /// Restrict delivery to rows matching a filter.
    pub fn with_filter(mut self, filter: RowFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Whether a change record should be delivered to this subscription.
    pub fn accepts(&self, record: &ChangeRecord) -> bool {
        record.table == self.table && self.kinds.contains(&record.kind) && self.filter.matches(record)
    }
}

/// Handle identifying an active subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    /// Subscription ID assigned by the feed.
    pub id: u64,
    /// Table being watched.
    pub table: String,
}

/// A source of row-level change notifications.
///
/// Both operations are synchronous so that a subscriber can release its
/// subscription deterministically before returning from its own teardown.
pub trait ChangeFeed: Send + Sync {
    /// Register a callback for changes matching `request`.
    fn subscribe(&self, request: SubscriptionRequest, callback: ChangeCallback)
        -> Result<SubscriptionHandle>;

    /// Remove a subscription. Unknown handles are reported as errors.
    fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use lensbook_proto::NOTIFICATIONS_TABLE;
    use serde_json::json;

    #[test]
    fn test_request_accepts() {
        let request = SubscriptionRequest::new(NOTIFICATIONS_TABLE)
            .with_kinds(&[ChangeKind::Insert])
            .with_filter(RowFilter::eq("userId", "u1"));

        let insert = ChangeRecord::insert(NOTIFICATIONS_TABLE, json!({"userId": "u1"}));
        let delete = ChangeRecord::delete(NOTIFICATIONS_TABLE, json!({"userId": "u1"}));
        let other_table = ChangeRecord::insert("bookings", json!({"userId": "u1"}));

        assert!(request.accepts(&insert));
        assert!(!request.accepts(&delete));
        assert!(!request.accepts(&other_table));
    }
}
