//! Wire-level value types: the inbound [`WebhookEvent`] and the outbound
//! [`WebhookResponse`].
//!
//! Both types serialise with camelCase field names so a transport adapter can
//! pass them through verbatim:
//!
//! ```text
//! WebhookEvent    { id, source, type, payload, timestamp, signature }
//! WebhookResponse { eventId, status, handlerResults: [{ handler, success, duration, error? }] }
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{EventId, EventSource, EventType};

/// Event payload: an unordered string-keyed map of arbitrary JSON values.
pub type Payload = Map<String, Value>;

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly. Serialises as an RFC 3339 string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

// ---------------------------------------------------------------------------
// Inbound event
// ---------------------------------------------------------------------------

/// One inbound delivery claim.
///
/// Produced by the transport layer after it has parsed the request; the
/// dispatcher treats it as immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Sender-assigned identifier, reused across redeliveries.
    pub id: EventId,

    /// Origin system; selects the verification secret.
    pub source: EventSource,

    /// Event kind used by handler predicates.
    #[serde(rename = "type")]
    pub event_type: EventType,

    /// Event body. The signature covers the canonical form of this map.
    #[serde(default)]
    pub payload: Payload,

    /// When the sender produced the event.
    pub timestamp: Timestamp,

    /// Origin-asserted digest in the form `sha256=<64 lowercase hex chars>`.
    #[serde(default)]
    pub signature: String,
}

impl WebhookEvent {
    /// Creates an unsigned event stamped with the current time.
    pub fn new(id: EventId, source: EventSource, event_type: EventType, payload: Payload) -> Self {
        Self {
            id,
            source,
            event_type,
            payload,
            timestamp: Timestamp::now(),
            signature: String::new(),
        }
    }

    /// Sets the signature header value verbatim.
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = signature.into();
        self
    }

    /// Sets the event timestamp.
    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Signs the payload with `secret`, replacing any existing signature.
    ///
    /// Produces exactly what a sender holding `secret` would attach.
    pub fn signed_with(self, secret: &str) -> Self {
        let signature = crate::verifier::sign_payload(secret, &self.payload).unwrap_or_default();
        self.with_signature(signature)
    }
}

// ---------------------------------------------------------------------------
// Outbound response
// ---------------------------------------------------------------------------

/// The dispatcher's verdict for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    /// Every matched handler succeeded, or the delivery was a duplicate.
    Accepted,
    /// Signature verification failed; no handler saw the event.
    Rejected,
    /// No handler matched, or at least one matched handler failed.
    Error,
}

impl std::fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// One handler's outcome within a dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerResult {
    /// Name the handler registered under.
    pub handler: String,

    /// `true` if `execute` returned `Ok`.
    pub success: bool,

    /// Wall-clock time spent in `execute`, serialised in whole milliseconds.
    #[serde(with = "duration_ms")]
    pub duration: Duration,

    /// Failure description; always present and non-empty when `success` is `false`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HandlerResult {
    /// Creates a successful result.
    pub fn succeeded(handler: impl Into<String>, duration: Duration) -> Self {
        Self {
            handler: handler.into(),
            success: true,
            duration,
            error: None,
        }
    }

    /// Creates a failed result carrying `error` as its message.
    pub fn failed(handler: impl Into<String>, duration: Duration, error: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            success: false,
            duration,
            error: Some(error.into()),
        }
    }
}

/// Aggregated response for one dispatched event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    /// Identifier of the event this response answers.
    pub event_id: EventId,

    /// Overall outcome.
    pub status: DispatchStatus,

    /// Per-handler outcomes in registration order. Empty for every early exit.
    pub handler_results: Vec<HandlerResult>,
}

impl WebhookResponse {
    /// Creates a response with no handler results (an early exit).
    pub fn early(event_id: EventId, status: DispatchStatus) -> Self {
        Self {
            event_id,
            status,
            handler_results: Vec::new(),
        }
    }

    /// Aggregates executed handler results: `Accepted` only if all succeeded.
    pub fn aggregate(event_id: EventId, handler_results: Vec<HandlerResult>) -> Self {
        let status = if handler_results.iter().all(|r| r.success) {
            DispatchStatus::Accepted
        } else {
            DispatchStatus::Error
        };
        Self {
            event_id,
            status,
            handler_results,
        }
    }

    /// Returns the results whose handler failed.
    pub fn failures(&self) -> impl Iterator<Item = &HandlerResult> {
        self.handler_results.iter().filter(|r| !r.success)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
