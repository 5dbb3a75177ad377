//! Time-bounded duplicate suppression for event identifiers.
//!
//! Senders redeliver webhooks when they do not see a timely acknowledgement,
//! so one logical event can arrive several times. The [`EventDeduplicator`]
//! remembers each identifier for a fixed TTL and answers whether it has
//! already been processed.
//!
//! The seen-set is self-bounding: every check first evicts entries older than
//! the TTL, so memory is proportional to the delivery rate times the TTL.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::trace;

use crate::EventId;

/// Default window during which a repeated identifier counts as a duplicate.
pub const DEFAULT_DEDUP_TTL: Duration = Duration::from_millis(300_000);

/// Remembers event identifiers for a fixed TTL.
#[derive(Debug)]
pub struct EventDeduplicator {
    ttl: Duration,
    /// Event identifier -> instant it was first seen.
    seen: Mutex<HashMap<EventId, Instant>>,
}

impl EventDeduplicator {
    /// Creates a deduplicator that remembers identifiers for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the configured TTL.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Check-and-set: returns `true` if `id` was seen within the TTL,
    /// otherwise records it as seen now and returns `false`.
    ///
    /// Eviction, lookup, and insertion happen under one lock acquisition, so
    /// of two concurrent calls with the same fresh `id` exactly one returns
    /// `false`.
    pub fn is_duplicate(&self, id: &EventId) -> bool {
        self.is_duplicate_at(id, Instant::now())
    }

    /// Read-only lookup: returns `true` if `id` was recorded within the TTL.
    ///
    /// Does not record `id` and does not evict anything.
    pub fn is_seen(&self, id: &EventId) -> bool {
        self.is_seen_at(id, Instant::now())
    }

    /// Number of identifiers currently tracked, including any that have
    /// expired but not yet been swept.
    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    /// Returns `true` if no identifiers are tracked.
    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }

    fn is_duplicate_at(&self, id: &EventId, now: Instant) -> bool {
        let mut seen = self.seen.lock();

        let before = seen.len();
        seen.retain(|_, first_seen| now.saturating_duration_since(*first_seen) <= self.ttl);
        let evicted = before - seen.len();
        if evicted > 0 {
            trace!(evicted, remaining = seen.len(), "Swept expired event identifiers");
        }

        if seen.contains_key(id) {
            return true;
        }
        seen.insert(id.clone(), now);
        false
    }

    fn is_seen_at(&self, id: &EventId, now: Instant) -> bool {
        self.seen
            .lock()
            .get(id)
            .is_some_and(|first_seen| now.saturating_duration_since(*first_seen) <= self.ttl)
    }
}

impl Default for EventDeduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_TTL)
    }
}
