//! Requests review when a pull request becomes reviewable.

use async_trait::async_trait;
use dispatch::{Handler, HandlerError, WebhookEvent};
use serde_json::{json, Value};
use tracing::info;

use crate::{EventFilter, HttpSink};

/// Pull-request actions that warrant a review request by default.
pub const DEFAULT_ACTIONS: [&str; 3] = ["opened", "ready_for_review", "synchronize"];

/// Notifies a review service about pull requests that need attention.
///
/// Matches `pull_request` events (by default from any source) whose
/// `payload.action` is one of the configured actions. Draft pull requests are
/// skipped except for the `ready_for_review` transition itself.
#[derive(Debug, Clone)]
pub struct PullRequestReviewNotifier {
    name: String,
    filter: EventFilter,
    actions: Vec<String>,
    sink: HttpSink,
}

impl PullRequestReviewNotifier {
    /// Creates a notifier named `name` posting to `sink`.
    pub fn new(name: impl Into<String>, sink: HttpSink) -> Self {
        Self {
            name: name.into(),
            filter: EventFilter::any().with_event_types(["pull_request"]),
            actions: DEFAULT_ACTIONS.iter().map(|a| a.to_string()).collect(),
            sink,
        }
    }

    /// Replaces the default `pull_request` filter.
    pub fn with_filter(mut self, filter: EventFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Replaces the set of actions that trigger a review request.
    pub fn with_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions = actions.into_iter().map(Into::into).collect();
        self
    }

    fn build_body(&self, event: &WebhookEvent) -> Result<Value, HandlerError> {
        let payload = &event.payload;
        let pull_request = payload.get("pull_request");
        let field = |name: &str| pull_request.and_then(|pr| pr.get(name)).cloned();

        let number = payload
            .get("number")
            .cloned()
            .or_else(|| field("number"))
            .filter(Value::is_u64)
            .ok_or_else(|| HandlerError::InvalidPayload("missing pull request `number`".into()))?;

        let author = pull_request
            .and_then(|pr| pr.pointer("/user/login"))
            .cloned()
            .unwrap_or(Value::Null);
        let repository = payload
            .get("repository")
            .and_then(|r| r.get("full_name"))
            .cloned()
            .unwrap_or(Value::Null);

        Ok(json!({
            "number": number,
            "title": field("title").unwrap_or(Value::Null),
            "author": author,
            "url": field("html_url").unwrap_or(Value::Null),
            "action": payload.get("action").cloned().unwrap_or(Value::Null),
            "repository": repository,
            "eventId": event.id.as_str(),
        }))
    }
}

#[async_trait]
impl Handler for PullRequestReviewNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn matches(&self, event: &WebhookEvent) -> bool {
        if !self.filter.accepts(event) {
            return false;
        }
        let Some(action) = event.payload.get("action").and_then(Value::as_str) else {
            return false;
        };
        let is_draft = event
            .payload
            .get("pull_request")
            .and_then(|pr| pr.get("draft"))
            .and_then(Value::as_bool)
            .unwrap_or(false);

        self.actions.iter().any(|a| a == action) && (!is_draft || action == "ready_for_review")
    }

    async fn execute(&self, event: &WebhookEvent) -> Result<(), HandlerError> {
        let body = self.build_body(event)?;
        self.sink.post_json(event, &body).await?;
        let number = &body["number"];
        info!(handler = %self.name, %number, "Review requested");
        Ok(())
    }
}
