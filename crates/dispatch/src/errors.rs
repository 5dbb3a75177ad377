//! Handler execution errors.
//!
//! [`HandlerError`] is what a [`crate::Handler`] returns when `execute` fails.
//! The dispatcher never propagates it: each error is rendered into the
//! `error` message of a failed [`crate::HandlerResult`] and execution moves on
//! to the next matched handler.
//!
//! Authentication failures, duplicate deliveries, and unroutable events are
//! not errors at all; they are encoded in [`crate::DispatchStatus`].

use std::time::Duration;

use thiserror::Error;

/// Failure raised by a handler while executing an event.
///
/// Infrastructure crates map their own transport errors onto these variants;
/// this crate has no network dependencies of its own.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The request to the downstream system could not be completed
    /// (connection refused, DNS failure, request timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// The downstream system answered with a non-success status.
    #[error("upstream returned {status}: {body}")]
    UpstreamStatus {
        /// HTTP status code returned by the downstream system.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The event payload lacks a field the handler requires.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Catch-all for handler-specific failures.
    #[error("handler failed: {0}")]
    Failed(String),

    /// The handler did not finish within the dispatcher's configured deadline.
    #[error("handler timed out after {}ms", .after.as_millis())]
    TimedOut {
        /// The deadline that elapsed.
        after: Duration,
    },

    /// The handler panicked; the panic was contained by the dispatcher.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_non_empty() {
        let errors = [
            HandlerError::Transport("connection refused".into()),
            HandlerError::UpstreamStatus {
                status: 503,
                body: "unavailable".into(),
            },
            HandlerError::InvalidPayload("missing field `number`".into()),
            HandlerError::Failed("boom".into()),
            HandlerError::TimedOut {
                after: Duration::from_millis(250),
            },
            HandlerError::Panicked("index out of bounds".into()),
        ];

        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }

    #[test]
    fn test_timeout_message_reports_millis() {
        let error = HandlerError::TimedOut {
            after: Duration::from_millis(1500),
        };
        assert_eq!(error.to_string(), "handler timed out after 1500ms");
    }
}
