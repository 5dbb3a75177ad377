//! Hookline handler collaborators.
//!
//! Implements the [`dispatch::Handler`] trait for the downstream systems a
//! webhook typically fans out to:
//!
//! - [`CiTriggerHandler`] — starts a CI build for pushes to watched branches.
//! - [`PullRequestReviewNotifier`] — requests review for reviewable pull requests.
//! - [`ChatNotifier`] — posts an event summary to a chat webhook.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport, request bodies, and upstream status
//! mapping live here. The [`dispatch`] crate sees only [`dispatch::Handler`]
//! and [`dispatch::HandlerError`].
//!
//! Every handler posts JSON through an [`HttpSink`]; sinks built from one
//! shared `reqwest::Client` share its connection pool. No handler retries:
//! a failed request is reported once and redelivery is the sender's concern.

pub mod chat;
pub mod ci_trigger;
pub mod filter;
pub mod http;
pub mod pr_review;

#[cfg(test)]
mod test_server;

pub use chat::{ChatFormat, ChatNotifier};
pub use ci_trigger::CiTriggerHandler;
pub use filter::EventFilter;
pub use http::HttpSink;
pub use pr_review::PullRequestReviewNotifier;

/// Re-exported so composition roots can share one client across sinks
/// without depending on `reqwest` directly.
pub use reqwest::Client;
