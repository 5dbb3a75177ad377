//! Posts a one-line summary of each matched event to a chat webhook.

use async_trait::async_trait;
use dispatch::{Handler, HandlerError, WebhookEvent};
use serde_json::{json, Value};
use tracing::info;

use crate::{EventFilter, HttpSink};

/// Message shape expected by the chat endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatFormat {
    /// `{ "text": "..." }`
    #[default]
    Plain,
    /// `{ "text": "...", "blocks": [ mrkdwn section ] }` as accepted by Slack
    /// incoming webhooks.
    Slack,
}

impl std::str::FromStr for ChatFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" | "json" => Ok(Self::Plain),
            "slack" => Ok(Self::Slack),
            other => Err(format!("unknown chat format '{other}' (expected 'plain' or 'slack')")),
        }
    }
}

/// Announces events in a chat channel.
///
/// Accepts whatever its [`EventFilter`] accepts (everything by default).
#[derive(Debug, Clone)]
pub struct ChatNotifier {
    name: String,
    filter: EventFilter,
    format: ChatFormat,
    sink: HttpSink,
}

impl ChatNotifier {
    /// Creates a notifier named `name` posting to `sink`.
    pub fn new(name: impl Into<String>, sink: HttpSink) -> Self {
        Self {
            name: name.into(),
            filter: EventFilter::any(),
            format: ChatFormat::default(),
            sink,
        }
    }

    /// Restricts which events are announced.
    pub fn with_filter(mut self, filter: EventFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Sets the message shape.
    pub fn with_format(mut self, format: ChatFormat) -> Self {
        self.format = format;
        self
    }

    fn summary(event: &WebhookEvent) -> String {
        let payload = &event.payload;
        let detail = payload
            .get("message")
            .or_else(|| payload.get("action"))
            .and_then(Value::as_str);
        let repository = payload
            .get("repository")
            .and_then(|r| r.get("full_name"))
            .and_then(Value::as_str);

        let mut text = format!("[{}] {}", event.source, event.event_type);
        if let Some(repository) = repository {
            text.push_str(&format!(" in {repository}"));
        }
        if let Some(detail) = detail {
            text.push_str(&format!(": {detail}"));
        }
        text.push_str(&format!(" ({})", event.id));
        text
    }

    fn build_body(&self, event: &WebhookEvent) -> Value {
        let text = Self::summary(event);
        match self.format {
            ChatFormat::Plain => json!({ "text": text }),
            ChatFormat::Slack => json!({
                "text": text,
                "blocks": [{
                    "type": "section",
                    "text": { "type": "mrkdwn", "text": text }
                }]
            }),
        }
    }
}

#[async_trait]
impl Handler for ChatNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn matches(&self, event: &WebhookEvent) -> bool {
        self.filter.accepts(event)
    }

    async fn execute(&self, event: &WebhookEvent) -> Result<(), HandlerError> {
        let body = self.build_body(event);
        self.sink.post_json(event, &body).await?;
        info!(handler = %self.name, "Chat notification sent");
        Ok(())
    }
}
