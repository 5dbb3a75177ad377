//! Starts a CI pipeline for pushes to watched branches.

use async_trait::async_trait;
use dispatch::{Handler, HandlerError, WebhookEvent};
use serde_json::{json, Value};
use tracing::info;

use crate::{EventFilter, HttpSink};

const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// Triggers a CI build by `POST`ing the pushed ref and commit to a CI endpoint.
///
/// Matches events accepted by its [`EventFilter`] (by default any source with
/// type `push`) whose `payload.ref` names a watched branch. With no branches
/// configured, every branch push matches; tag pushes never do.
///
/// Request body:
///
/// ```json
/// { "ref": "refs/heads/main", "branch": "main", "sha": "<after>",
///   "repository": "owner/repo", "eventId": "...", "source": "github" }
/// ```
#[derive(Debug, Clone)]
pub struct CiTriggerHandler {
    name: String,
    filter: EventFilter,
    branches: Vec<String>,
    sink: HttpSink,
}

impl CiTriggerHandler {
    /// Creates a trigger named `name` posting to `sink`.
    pub fn new(name: impl Into<String>, sink: HttpSink) -> Self {
        Self {
            name: name.into(),
            filter: EventFilter::any().with_event_types(["push"]),
            branches: Vec::new(),
            sink,
        }
    }

    /// Replaces the default `push` filter.
    pub fn with_filter(mut self, filter: EventFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Only trigger for these branch names (without `refs/heads/`).
    pub fn with_branches<I, S>(mut self, branches: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.branches = branches.into_iter().map(Into::into).collect();
        self
    }

    fn watched_branch<'a>(&self, event: &'a WebhookEvent) -> Option<&'a str> {
        let branch = event
            .payload
            .get("ref")
            .and_then(Value::as_str)?
            .strip_prefix(BRANCH_REF_PREFIX)?;
        if self.branches.is_empty() || self.branches.iter().any(|b| b == branch) {
            Some(branch)
        } else {
            None
        }
    }

    fn build_body(&self, event: &WebhookEvent, branch: &str) -> Value {
        let payload = &event.payload;
        let sha = payload
            .get("after")
            .or_else(|| payload.get("sha"))
            .cloned()
            .unwrap_or(Value::Null);
        let repository = payload
            .get("repository")
            .and_then(|r| r.get("full_name").or(Some(r)))
            .and_then(Value::as_str)
            .map_or(Value::Null, |s| Value::String(s.to_string()));

        json!({
            "ref": format!("{BRANCH_REF_PREFIX}{branch}"),
            "branch": branch,
            "sha": sha,
            "repository": repository,
            "eventId": event.id.as_str(),
            "source": event.source.as_str(),
        })
    }
}

#[async_trait]
impl Handler for CiTriggerHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn matches(&self, event: &WebhookEvent) -> bool {
        self.filter.accepts(event) && self.watched_branch(event).is_some()
    }

    async fn execute(&self, event: &WebhookEvent) -> Result<(), HandlerError> {
        let branch = self
            .watched_branch(event)
            .ok_or_else(|| HandlerError::InvalidPayload("no watched branch in `ref`".into()))?;
        let body = self.build_body(event, branch);
        self.sink.post_json(event, &body).await?;
        info!(handler = %self.name, branch, url = %self.sink.url(), "CI build triggered");
        Ok(())
    }
}
