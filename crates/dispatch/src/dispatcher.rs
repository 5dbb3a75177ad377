//! The dispatch protocol.
//!
//! [`Dispatcher::dispatch`] takes one [`WebhookEvent`] through a strict
//! pipeline with no backtracking:
//!
//! ```text
//! Received ──verify──▶ Rejected                       (terminal)
//!    │
//!    ├──dedup───▶ Duplicate-Accepted                  (terminal)
//!    │
//!    ├──route───▶ Unrouted-Error + dead letter        (terminal)
//!    │
//!    └──▶ Routed ──▶ Executed ──▶ Aggregated           (terminal)
//! ```
//!
//! Before verification, an identifier already recorded inside the dedup
//! window is answered as a duplicate straight away. Only identifiers that
//! passed verification are ever recorded, so this fast path never lets an
//! unauthenticated event reach a handler, and a forged first delivery cannot
//! block the genuine one.
//!
//! ## Failure policy
//!
//! `dispatch` is infallible. Every failure mode is encoded in the returned
//! [`WebhookResponse`]: authentication failure as `rejected`, an unroutable
//! event or any failed handler as `error`. Handler errors, panics, and
//! deadline expiry each become a failed [`HandlerResult`].
//!
//! ## Concurrency
//!
//! A `Dispatcher` is shared behind `Arc` and serves concurrent dispatches.
//! Within one dispatch, matched handlers run strictly one after another so
//! `handler_results` follows registration order. No lock is held across a
//! handler's `execute`.

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::dedup::DEFAULT_DEDUP_TTL;
use crate::{
    DeadLetterSink, DispatchStatus, EventDeduplicator, EventSource, Handler, HandlerError,
    HandlerResult, HandlerSet, SignatureVerifier, WebhookEvent, WebhookResponse,
};

/// Tunables for a [`Dispatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// How long a processed event identifier suppresses redeliveries.
    pub dedup_ttl: Duration,

    /// Deadline for a single handler's `execute`.
    ///
    /// `None` (the default) imposes no deadline: a handler that never
    /// completes stalls its own dispatch, and callers needing bounded latency
    /// must wrap `dispatch` in their own timeout.
    pub handler_timeout: Option<Duration>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            dedup_ttl: DEFAULT_DEDUP_TTL,
            handler_timeout: None,
        }
    }
}

/// Orchestrates verification, deduplication, routing, execution, and
/// aggregation for inbound webhook events.
///
/// Owns every piece of mutable state the protocol needs; construct one at
/// startup and share it by reference or `Arc`.
#[derive(Debug)]
pub struct Dispatcher {
    config: DispatcherConfig,
    verifier: SignatureVerifier,
    dedup: EventDeduplicator,
    handlers: HandlerSet,
    dead_letters: DeadLetterSink,
}

impl Dispatcher {
    /// Creates a dispatcher with no secrets and no handlers.
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            config,
            verifier: SignatureVerifier::new(),
            dedup: EventDeduplicator::new(config.dedup_ttl),
            handlers: HandlerSet::new(),
            dead_letters: DeadLetterSink::new(),
        }
    }

    /// Returns the configuration this dispatcher was built with.
    pub fn config(&self) -> DispatcherConfig {
        self.config
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Binds `secret` to `source`; a later call for the same source wins.
    pub fn register_secret(&self, source: EventSource, secret: impl Into<String>) {
        self.verifier.register_secret(source, secret);
    }

    /// Appends `handler` to the routing table.
    pub fn register_handler(&self, handler: Arc<dyn Handler>) {
        self.handlers.register(handler);
    }

    /// Names of the registered handlers, in execution order.
    pub fn handler_names(&self) -> Vec<String> {
        self.handlers.names()
    }

    // -----------------------------------------------------------------------
    // Dead letters
    // -----------------------------------------------------------------------

    /// Snapshot of the events no handler matched.
    pub fn peek_dead_letters(&self) -> Vec<WebhookEvent> {
        self.dead_letters.peek()
    }

    /// Removes and returns the events no handler matched.
    pub fn drain_dead_letters(&self) -> Vec<WebhookEvent> {
        self.dead_letters.drain()
    }

    /// Number of events currently parked as dead letters.
    pub fn dead_letter_count(&self) -> usize {
        self.dead_letters.len()
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Runs `event` through the dispatch protocol and returns the verdict.
    pub async fn dispatch(&self, event: WebhookEvent) -> WebhookResponse {
        let span = info_span!(
            "dispatch",
            event_id = %event.id,
            source = %event.source,
            event_type = %event.event_type,
        );
        self.dispatch_inner(event).instrument(span).await
    }

    async fn dispatch_inner(&self, event: WebhookEvent) -> WebhookResponse {
        if self.dedup.is_seen(&event.id) {
            info!("Redelivery of processed event acknowledged without execution");
            return WebhookResponse::early(event.id, DispatchStatus::Accepted);
        }

        if !self.verifier.verify(&event) {
            warn!("Signature verification failed; event rejected");
            return WebhookResponse::early(event.id, DispatchStatus::Rejected);
        }

        if self.dedup.is_duplicate(&event.id) {
            info!("Duplicate delivery acknowledged without execution");
            return WebhookResponse::early(event.id, DispatchStatus::Accepted);
        }

        let matched = self.handlers.matching(&event);
        if matched.is_empty() {
            let event_id = event.id.clone();
            self.dead_letters.push(event);
            return WebhookResponse::early(event_id, DispatchStatus::Error);
        }

        debug!(matched = matched.len(), "Routing event to handlers");

        let event_id = event.id.clone();
        let event = Arc::new(event);
        let mut results = Vec::with_capacity(matched.len());
        for handler in matched {
            results.push(self.run_handler(handler, Arc::clone(&event)).await);
        }

        let response = WebhookResponse::aggregate(event_id, results);
        info!(
            status = %response.status,
            executed = response.handler_results.len(),
            failed = response.failures().count(),
            "Event dispatched"
        );
        response
    }

    /// Executes one handler on its own task and converts the outcome,
    /// including a panic or an expired deadline, into a [`HandlerResult`].
    ///
    /// The task lives no longer than this future: dropping the dispatch
    /// aborts the handler at its next suspension point.
    async fn run_handler(&self, handler: Arc<dyn Handler>, event: Arc<WebhookEvent>) -> HandlerResult {
        let name = handler.name().to_string();
        let timeout = self.config.handler_timeout;
        let started = Instant::now();

        let mut task = AbortOnDrop(tokio::spawn(
            async move {
                match timeout {
                    Some(limit) => tokio::time::timeout(limit, handler.execute(&event))
                        .await
                        .unwrap_or(Err(HandlerError::TimedOut { after: limit })),
                    None => handler.execute(&event).await,
                }
            }
            .in_current_span(),
        ));

        let outcome = (&mut task.0).await.unwrap_or_else(|e| Err(join_failure(e)));
        let duration = started.elapsed();

        match outcome {
            Ok(()) => {
                debug!(handler = %name, duration_ms = duration.as_millis() as u64, "Handler succeeded");
                HandlerResult::succeeded(name, duration)
            }
            Err(error) => {
                warn!(
                    handler = %name,
                    duration_ms = duration.as_millis() as u64,
                    error = %error,
                    "Handler failed"
                );
                HandlerResult::failed(name, duration, error.to_string())
            }
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DispatcherConfig::default())
    }
}

/// Aborts the handler task if the dispatch awaiting it is dropped.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn join_failure(error: JoinError) -> HandlerError {
    if error.is_panic() {
        HandlerError::Panicked(panic_message(error.into_panic()))
    } else {
        HandlerError::Failed("handler task was cancelled".to_string())
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventId, EventType, Payload};
    use async_trait::async_trait;

    struct Panics;

    #[async_trait]
    impl Handler for Panics {
        fn name(&self) -> &str {
            "panics"
        }

        fn matches(&self, _event: &WebhookEvent) -> bool {
            true
        }

        async fn execute(&self, _event: &WebhookEvent) -> Result<(), HandlerError> {
            panic!("handler exploded");
        }
    }

    struct Sleeps(Duration);

    #[async_trait]
    impl Handler for Sleeps {
        fn name(&self) -> &str {
            "sleeps"
        }

        fn matches(&self, _event: &WebhookEvent) -> bool {
            true
        }

        async fn execute(&self, _event: &WebhookEvent) -> Result<(), HandlerError> {
            tokio::time::sleep(self.0).await;
            Ok(())
        }
    }

    fn signed_event(id: &str) -> WebhookEvent {
        WebhookEvent::new(
            EventId::new(id).unwrap(),
            EventSource::new("github").unwrap(),
            EventType::new("push").unwrap(),
            Payload::new(),
        )
        .signed_with("secret")
    }

    fn dispatcher(config: DispatcherConfig) -> Dispatcher {
        let dispatcher = Dispatcher::new(config);
        dispatcher.register_secret(EventSource::new("github").unwrap(), "secret");
        dispatcher
    }

    #[test]
    fn test_default_config_has_no_handler_deadline() {
        let config = DispatcherConfig::default();
        assert_eq!(config.dedup_ttl, Duration::from_millis(300_000));
        assert!(config.handler_timeout.is_none());
    }

    #[tokio::test]
    async fn test_panicking_handler_becomes_failed_result() {
        let dispatcher = dispatcher(DispatcherConfig::default());
        dispatcher.register_handler(Arc::new(Panics));

        let response = dispatcher.dispatch(signed_event("p-1")).await;

        assert_eq!(response.status, DispatchStatus::Error);
        assert_eq!(response.handler_results.len(), 1);
        let result = &response.handler_results[0];
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("handler panicked: handler exploded"));
    }

    #[tokio::test]
    async fn test_handler_timeout_becomes_failed_result() {
        let dispatcher = dispatcher(DispatcherConfig {
            handler_timeout: Some(Duration::from_millis(20)),
            ..DispatcherConfig::default()
        });
        dispatcher.register_handler(Arc::new(Sleeps(Duration::from_secs(5))));

        let response = dispatcher.dispatch(signed_event("t-1")).await;

        assert_eq!(response.status, DispatchStatus::Error);
        let result = &response.handler_results[0];
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("handler timed out after 20ms"));
    }

    #[tokio::test]
    async fn test_fast_handler_within_deadline_succeeds() {
        let dispatcher = dispatcher(DispatcherConfig {
            handler_timeout: Some(Duration::from_secs(5)),
            ..DispatcherConfig::default()
        });
        dispatcher.register_handler(Arc::new(Sleeps(Duration::from_millis(1))));

        let response = dispatcher.dispatch(signed_event("t-2")).await;
        assert_eq!(response.status, DispatchStatus::Accepted);
    }

    struct SleepsThenCounts {
        delay: Duration,
        completed: Arc<std::sync::atomic::AtomicUsize>,
    }

    #[async_trait]
    impl Handler for SleepsThenCounts {
        fn name(&self) -> &str {
            "sleeps-then-counts"
        }

        fn matches(&self, _event: &WebhookEvent) -> bool {
            true
        }

        async fn execute(&self, _event: &WebhookEvent) -> Result<(), HandlerError> {
            tokio::time::sleep(self.delay).await;
            self.completed.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_dropping_dispatch_cancels_running_handler() {
        let completed = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let dispatcher = dispatcher(DispatcherConfig::default());
        dispatcher.register_handler(Arc::new(SleepsThenCounts {
            delay: Duration::from_millis(100),
            completed: Arc::clone(&completed),
        }));

        let outcome = tokio::time::timeout(
            Duration::from_millis(20),
            dispatcher.dispatch(signed_event("c-1")),
        )
        .await;
        assert!(outcome.is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(completed.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panic_message_extraction() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(42_u8)), "non-string panic payload");
    }
}
