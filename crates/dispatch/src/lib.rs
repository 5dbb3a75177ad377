//! Core webhook ingestion and dispatch engine for Hookline.
//!
//! This crate accepts an already-parsed inbound event, authenticates its
//! origin, suppresses duplicate deliveries, routes it to every capable
//! handler, executes those handlers, and folds their outcomes into one
//! response. Events no handler wants are parked as dead letters.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate performs no network I/O.
//! Transport adapters produce [`WebhookEvent`]s; infrastructure crates supply
//! [`Handler`] implementations. Secrets arrive as opaque strings from whoever
//! wires the system.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype event identifiers (`EventId`, `EventSource`, `EventType`) |
//! | [`types`] | Wire types (`WebhookEvent`, `WebhookResponse`, `HandlerResult`) |
//! | [`errors`] | [`HandlerError`], the failure type of [`Handler::execute`] |
//! | [`verifier`] | HMAC-SHA256 signature verification keyed by source |
//! | [`dedup`] | TTL-bounded seen-set for event identifiers |
//! | [`handler`] | The [`Handler`] trait and the ordered [`HandlerSet`] |
//! | [`dead_letter`] | In-memory buffer of unroutable events |
//! | [`dispatcher`] | The [`Dispatcher`] and its five-step protocol |
//!
//! ## Example
//!
//! ```rust
//! use dispatch::{Dispatcher, DispatchStatus, EventId, EventSource, EventType, Payload, WebhookEvent};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let dispatcher = Dispatcher::default();
//! dispatcher.register_secret(EventSource::new("github").unwrap(), "s3cr3t");
//!
//! let event = WebhookEvent::new(
//!     EventId::new("delivery-1").unwrap(),
//!     EventSource::new("github").unwrap(),
//!     EventType::new("push").unwrap(),
//!     Payload::new(),
//! )
//! .signed_with("s3cr3t");
//!
//! // No handlers registered: the event is authenticated but unroutable.
//! let response = dispatcher.dispatch(event).await;
//! assert_eq!(response.status, DispatchStatus::Error);
//! assert_eq!(dispatcher.drain_dead_letters().len(), 1);
//! # }
//! ```

pub mod dead_letter;
pub mod dedup;
pub mod dispatcher;
pub mod errors;
pub mod handler;
pub mod identifiers;
pub mod types;
pub mod verifier;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use dead_letter::DeadLetterSink;
pub use dedup::{EventDeduplicator, DEFAULT_DEDUP_TTL};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use errors::HandlerError;
pub use handler::{Handler, HandlerSet};
pub use identifiers::{EventId, EventSource, EventType};
pub use types::{
    DispatchStatus, HandlerResult, Payload, Timestamp, WebhookEvent, WebhookResponse,
};
pub use verifier::{canonical_json, sign_payload, SignatureError, SignatureVerifier};
