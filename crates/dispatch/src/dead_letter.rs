//! In-memory parking area for events no handler matched.
//!
//! Operators inspect the buffer with [`DeadLetterSink::peek`] and take
//! ownership of its contents, e.g. for replay, with [`DeadLetterSink::drain`].
//! Nothing is retried automatically and nothing survives a restart.

use parking_lot::Mutex;
use tracing::warn;

use crate::WebhookEvent;

/// Append-only buffer of unroutable events.
#[derive(Debug, Default)]
pub struct DeadLetterSink {
    entries: Mutex<Vec<WebhookEvent>>,
}

impl DeadLetterSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `event` unmodified.
    pub fn push(&self, event: WebhookEvent) {
        let mut entries = self.entries.lock();
        warn!(
            event_id = %event.id,
            source = %event.source,
            event_type = %event.event_type,
            parked = entries.len() + 1,
            "No handler matched; event moved to dead letters"
        );
        entries.push(event);
    }

    /// Returns a copy of the buffered events, oldest first, leaving the
    /// buffer untouched.
    pub fn peek(&self) -> Vec<WebhookEvent> {
        self.entries.lock().clone()
    }

    /// Returns the buffered events, oldest first, and empties the buffer.
    ///
    /// Take-and-clear happens under one lock acquisition: a concurrent
    /// `push` lands either in the returned list or in the emptied buffer.
    pub fn drain(&self) -> Vec<WebhookEvent> {
        std::mem::take(&mut *self.entries.lock())
    }

    /// Number of buffered events.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
