use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::parser::NormalizedEvent;

/// Fixed-capacity in-memory event ring.
///
/// When full, the oldest event is evicted to make room; every eviction is
/// counted. Readers take the shared lock and clone out `Arc`s, so queries
/// never hold the lock while the caller inspects events.
#[derive(Debug)]
pub struct EventStore {
    events: RwLock<VecDeque<Arc<NormalizedEvent>>>,
    capacity: usize,
    evicted: AtomicU64,
}

impl EventStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: RwLock::new(VecDeque::with_capacity(capacity.min(65_536))),
            capacity,
            evicted: AtomicU64::new(0),
        }
    }

    /// Append an event, evicting the oldest when at capacity.
    /// Returns true when an eviction happened.
    pub fn push(&self, event: Arc<NormalizedEvent>) -> bool {
        let mut events = self.events.write();
        let evicted = if events.len() >= self.capacity {
            events.pop_front();
            self.evicted.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        };
        events.push_back(event);
        evicted
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Up to `limit` events, most recent first, taken from the newest
    /// `window` entries that satisfy `predicate`.
    pub fn scan_recent<F>(&self, window: usize, limit: usize, mut predicate: F) -> Vec<Arc<NormalizedEvent>>
    where
        F: FnMut(&NormalizedEvent) -> bool,
    {
        let events = self.events.read();
        events
            .iter()
            .rev()
            .take(window)
            .filter(|event| predicate(event))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Everything currently held, oldest first.
    pub fn snapshot(&self) -> Vec<Arc<NormalizedEvent>> {
        self.events.read().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{LogFormat, Severity};
    use chrono::Utc;

    fn event(msg: &str) -> Arc<NormalizedEvent> {
        Arc::new(NormalizedEvent::new(Utc::now(), Severity::Info, msg, msg, LogFormat::Json))
    }

    #[test]
    fn test_push_and_snapshot_order() {
        let store = EventStore::new(10);
        store.push(event("a"));
        store.push(event("b"));
        let messages: Vec<_> = store.snapshot().iter().map(|e| e.message.clone()).collect();
        assert_eq!(messages, vec!["a", "b"]);
    }

    #[test]
    fn test_evicts_oldest_when_full() {
        let store = EventStore::new(2);
        assert!(!store.push(event("a")));
        assert!(!store.push(event("b")));
        assert!(store.push(event("c")));
        assert_eq!(store.len(), 2);
        assert_eq!(store.evicted(), 1);
        assert_eq!(store.snapshot()[0].message, "b");
    }

    #[test]
    fn test_scan_recent_most_recent_first() {
        let store = EventStore::new(10);
        for msg in ["a", "b", "c", "d"] {
            store.push(event(msg));
        }
        let hits = store.scan_recent(10, 2, |_| true);
        let messages: Vec<_> = hits.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["d", "c"]);

        // window limits how far back the scan goes
        let hits = store.scan_recent(2, 10, |e| e.message == "a");
        assert!(hits.is_empty());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let store = EventStore::new(0);
        store.push(event("a"));
        store.push(event("b"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.capacity(), 1);
    }
}
