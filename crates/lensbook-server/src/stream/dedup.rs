//! Bounded set of already-forwarded notification ids.

use std::collections::{HashSet, VecDeque};

use lensbook_proto::NotificationId;

/// Remembers the most recent `capacity` ids, evicting the oldest first.
#[derive(Debug)]
pub struct DedupSet {
    ids: HashSet<NotificationId>,
    order: VecDeque<NotificationId>,
    capacity: usize,
}

impl DedupSet {
    /// Create a set that holds at most `capacity` ids (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ids: HashSet::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    /// Record `id`, returning `false` if it was already present.
    pub fn insert(&mut self, id: NotificationId) -> bool {
        if !self.ids.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.ids.remove(&evicted);
            }
        }
        true
    }

    pub fn contains(&self, id: &NotificationId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_rejects_repeats() {
        let mut set = DedupSet::new(8);
        let id = Uuid::new_v4();
        assert!(set.insert(id));
        assert!(!set.insert(id));
        assert!(!set.insert(id));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_evicts_oldest_past_capacity() {
        let mut set = DedupSet::new(2);
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        assert!(set.insert(a));
        assert!(set.insert(b));
        assert!(set.insert(c));

        assert_eq!(set.len(), 2);
        assert!(!set.contains(&a));
        assert!(set.contains(&b));
        assert!(set.contains(&c));

        // A repeat inside the window does not refresh its position.
        assert!(!set.insert(b));
        assert!(set.insert(a));
        assert!(!set.contains(&b));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut set = DedupSet::new(0);
        assert_eq!(set.capacity(), 1);
        let id = Uuid::new_v4();
        assert!(set.insert(id));
        assert!(!set.insert(id));
    }
}
