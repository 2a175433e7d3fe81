//! Subscription tracking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use super::source::{ChangeCallback, SubscriptionRequest};

/// A subscription entry tracking an active subscription.
pub struct SubscriptionEntry {
    /// Unique subscription ID.
    pub id: u64,
    /// What the subscriber asked for.
    pub request: SubscriptionRequest,
    /// Delivery callback.
    pub(crate) callback: ChangeCallback,
    /// When the subscription was created.
    pub created_at: Instant,
    /// Number of changes delivered to this subscription.
    events_delivered: AtomicU64,
}

impl SubscriptionEntry {
    /// Create a new subscription entry.
    pub fn new(id: u64, request: SubscriptionRequest, callback: ChangeCallback) -> Self {
        Self {
            id,
            request,
            callback,
            created_at: Instant::now(),
            events_delivered: AtomicU64::new(0),
        }
    }

    /// Get the age of this subscription.
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    /// Increment the delivered counter.
    pub fn record_delivery(&self) {
        self.events_delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of changes delivered so far.
    pub fn events_delivered(&self) -> u64 {
        self.events_delivered.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for SubscriptionEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionEntry")
            .field("id", &self.id)
            .field("request", &self.request)
            .field("events_delivered", &self.events_delivered())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_subscription_entry() {
        let callback: ChangeCallback = Arc::new(|_| Ok(()));
        let entry = SubscriptionEntry::new(1, SubscriptionRequest::new("notifications"), callback);

        assert_eq!(entry.id, 1);
        assert_eq!(entry.request.table, "notifications");
        assert_eq!(entry.events_delivered(), 0);

        entry.record_delivery();
        assert_eq!(entry.events_delivered(), 1);
    }
}
