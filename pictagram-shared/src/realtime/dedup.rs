//! Duplicate suppression for realtime consumers.
//!
//! A `message_sent` confirmation and a `new_message` relay can both
//! describe the same stored message, and their arrival order relative to
//! the REST mutation response is not guaranteed. Consumers run every
//! incoming message id through [`MessageDedup`] before touching UI state.

use std::collections::{HashSet, VecDeque};

use crate::config::server::RealtimeConfig;

/// Bounded recently-seen set of message ids, oldest evicted first.
///
/// The bound trades memory for liveness only: the persisted message list
/// fetched on reconnect or refresh remains the source of truth, so an
/// evicted id being processed again affects nothing durable.
#[derive(Debug)]
pub struct MessageDedup {
    capacity: usize,
    seen: HashSet<i64>,
    order: VecDeque<i64>,
}

impl MessageDedup {
    /// Default window size.
    pub const DEFAULT_CAPACITY: usize = 100;

    /// Creates a dedup window holding at most `capacity` ids.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            seen: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    /// Creates a dedup window sized by the realtime settings, so clients
    /// sharing the server's configuration stay in step with its defaults.
    #[must_use]
    pub fn from_config(config: &RealtimeConfig) -> Self {
        Self::new(config.dedup_capacity)
    }

    /// Records `message_id` and reports whether it should be processed.
    ///
    /// Returns `true` exactly once per id while it remains in the window;
    /// repeated calls with the same id return `false`.
    pub fn observe(&mut self, message_id: i64) -> bool {
        if self.seen.contains(&message_id) {
            return false;
        }

        if self.order.len() == self.capacity
            && let Some(oldest) = self.order.pop_front()
        {
            self.seen.remove(&oldest);
        }

        self.order.push_back(message_id);
        self.seen.insert(message_id);
        true
    }

    /// Whether `message_id` is currently in the window.
    #[must_use]
    pub fn contains(&self, message_id: i64) -> bool {
        self.seen.contains(&message_id)
    }

    /// Number of ids currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the window is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for MessageDedup {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_passes_second_is_suppressed() {
        let mut dedup = MessageDedup::default();
        assert!(dedup.observe(42));
        assert!(!dedup.observe(42));
        assert!(dedup.observe(43));
    }

    #[test]
    fn oldest_id_is_evicted_beyond_capacity() {
        let mut dedup = MessageDedup::new(100);
        for id in 1..=100 {
            assert!(dedup.observe(id));
        }
        assert_eq!(dedup.len(), 100);

        // The 101st insertion evicts id 1's membership.
        assert!(dedup.observe(101));
        assert_eq!(dedup.len(), 100);
        assert!(!dedup.contains(1));
        assert!(dedup.contains(2));
        assert!(dedup.observe(1));
    }

    #[test]
    fn window_size_follows_realtime_config() {
        let config = RealtimeConfig {
            channel_capacity: 64,
            dedup_capacity: 2,
        };

        let mut dedup = MessageDedup::from_config(&config);
        assert!(dedup.observe(1));
        assert!(dedup.observe(2));
        assert!(dedup.observe(3));

        // Capacity 2: id 1 has been evicted, ids 2 and 3 remain.
        assert!(!dedup.contains(1));
        assert!(dedup.contains(2));
        assert!(dedup.contains(3));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut dedup = MessageDedup::new(0);
        assert!(dedup.observe(1));
        assert!(!dedup.observe(1));
        assert!(dedup.observe(2));
        assert_eq!(dedup.len(), 1);
    }
}
