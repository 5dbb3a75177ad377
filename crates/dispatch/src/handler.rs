//! The handler capability and the ordered set of registered handlers.
//!
//! A [`Handler`] is a pluggable unit of business logic: it declares which
//! events it can handle via [`Handler::matches`] and does the work in
//! [`Handler::execute`], which may perform arbitrary I/O.
//!
//! ## Creating a handler
//!
//! ```rust
//! use async_trait::async_trait;
//! use dispatch::{Handler, HandlerError, WebhookEvent};
//!
//! struct AuditLog;
//!
//! #[async_trait]
//! impl Handler for AuditLog {
//!     fn name(&self) -> &str {
//!         "audit-log"
//!     }
//!
//!     fn matches(&self, event: &WebhookEvent) -> bool {
//!         event.source.as_str() == "github"
//!     }
//!
//!     async fn execute(&self, event: &WebhookEvent) -> Result<(), HandlerError> {
//!         tracing::info!(event_id = %event.id, "audited");
//!         Ok(())
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::{HandlerError, WebhookEvent};

/// A capability invoked for the events it declares itself able to handle.
///
/// Handlers must be `Send + Sync`: one instance serves every concurrent
/// dispatch, and `execute` runs on its own task.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Name used to correlate [`crate::HandlerResult`]s with this handler.
    fn name(&self) -> &str;

    /// Returns `true` if this handler should execute `event`.
    ///
    /// Must be cheap and side-effect free; it is evaluated for every
    /// authenticated, non-duplicate event.
    fn matches(&self, event: &WebhookEvent) -> bool;

    /// Handles `event`.
    ///
    /// An `Err` is recorded as a failed result; it does not stop the other
    /// matched handlers from running.
    async fn execute(&self, event: &WebhookEvent) -> Result<(), HandlerError>;
}

/// Append-only, ordered collection of handlers.
///
/// Registration order is both evaluation order for [`HandlerSet::matching`]
/// and execution order in the dispatcher. The same handler may be registered
/// more than once; no deduplication or priority is applied.
#[derive(Default)]
pub struct HandlerSet {
    handlers: RwLock<Vec<Arc<dyn Handler>>>,
}

impl HandlerSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `handler` after every previously registered handler.
    pub fn register(&self, handler: Arc<dyn Handler>) {
        let mut handlers = self.handlers.write();
        debug!(
            handler = %handler.name(),
            position = handlers.len(),
            "Registering webhook handler"
        );
        handlers.push(handler);
    }

    /// Returns the handlers whose predicate accepts `event`, in registration
    /// order.
    ///
    /// The returned list is a snapshot; the registry lock is released before
    /// any handler executes.
    pub fn matching(&self, event: &WebhookEvent) -> Vec<Arc<dyn Handler>> {
        self.handlers
            .read()
            .iter()
            .filter(|h| h.matches(event))
            .cloned()
            .collect()
    }

    /// Names of all registered handlers, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.handlers
            .read()
            .iter()
            .map(|h| h.name().to_string())
            .collect()
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Returns `true` if no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

impl std::fmt::Debug for HandlerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerSet")
            .field("handlers", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventId, EventSource, EventType, Payload};

    struct TypeHandler {
        name: &'static str,
        event_type: &'static str,
    }

    #[async_trait]
    impl Handler for TypeHandler {
        fn name(&self) -> &str {
            self.name
        }

        fn matches(&self, event: &WebhookEvent) -> bool {
            event.event_type.as_str() == self.event_type
        }

        async fn execute(&self, _event: &WebhookEvent) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    fn event(event_type: &str) -> WebhookEvent {
        WebhookEvent::new(
            EventId::new("evt").unwrap(),
            EventSource::new("github").unwrap(),
            EventType::new(event_type).unwrap(),
            Payload::new(),
        )
    }

    #[test]
    fn test_matching_preserves_registration_order() {
        let set = HandlerSet::new();
        set.register(Arc::new(TypeHandler { name: "c", event_type: "push" }));
        set.register(Arc::new(TypeHandler { name: "a", event_type: "issues" }));
        set.register(Arc::new(TypeHandler { name: "b", event_type: "push" }));

        let names: Vec<_> = set
            .matching(&event("push"))
            .iter()
            .map(|h| h.name().to_string())
            .collect();
        assert_eq!(names, vec!["c", "b"]);
        assert_eq!(set.names(), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_no_match_yields_empty_route() {
        let set = HandlerSet::new();
        assert!(set.is_empty());
        set.register(Arc::new(TypeHandler { name: "ci", event_type: "push" }));

        assert!(set.matching(&event("deployment")).is_empty());
        assert_eq!(set.len(), 1);
    }
}
