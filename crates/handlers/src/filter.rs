//! Source and event-type predicates shared by every handler.

use dispatch::WebhookEvent;

/// Declarative predicate over an event's source and type.
///
/// An empty list accepts anything. Event-type patterns may end in `*` to
/// match by prefix: `"pull_request*"` accepts `pull_request` and
/// `pull_request_review`; a bare `"*"` accepts every type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    sources: Vec<String>,
    event_types: Vec<String>,
}

impl EventFilter {
    /// A filter that accepts every event.
    pub fn any() -> Self {
        Self::default()
    }

    /// Restricts the filter to the given sources.
    pub fn with_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources = sources.into_iter().map(Into::into).collect();
        self
    }

    /// Restricts the filter to the given event-type patterns.
    pub fn with_event_types<I, S>(mut self, event_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.event_types = event_types.into_iter().map(Into::into).collect();
        self
    }

    /// Returns `true` if `event` passes both the source and type checks.
    pub fn accepts(&self, event: &WebhookEvent) -> bool {
        let source_ok =
            self.sources.is_empty() || self.sources.iter().any(|s| s == event.source.as_str());
        let type_ok = self.event_types.is_empty()
            || self
                .event_types
                .iter()
                .any(|pattern| type_matches(pattern, event.event_type.as_str()));
        source_ok && type_ok
    }
}

fn type_matches(pattern: &str, event_type: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => event_type.starts_with(prefix),
        None => pattern == event_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch::{EventId, EventSource, EventType, Payload};

    fn event(source: &str, event_type: &str) -> WebhookEvent {
        WebhookEvent::new(
            EventId::new("e").unwrap(),
            EventSource::new(source).unwrap(),
            EventType::new(event_type).unwrap(),
            Payload::new(),
        )
    }

    #[test]
    fn test_empty_filter_accepts_everything() {
        let filter = EventFilter::any();
        assert!(filter.accepts(&event("github", "push")));
        assert!(filter.accepts(&event("slack", "message")));
    }

    #[test]
    fn test_source_and_type_must_both_match() {
        let filter = EventFilter::any()
            .with_sources(["github"])
            .with_event_types(["push"]);

        assert!(filter.accepts(&event("github", "push")));
        assert!(!filter.accepts(&event("gitlab", "push")));
        assert!(!filter.accepts(&event("github", "issues")));
    }

    #[test]
    fn test_trailing_wildcard_matches_prefix() {
        let filter = EventFilter::any().with_event_types(["pull_request*"]);

        assert!(filter.accepts(&event("github", "pull_request")));
        assert!(filter.accepts(&event("github", "pull_request_review")));
        assert!(!filter.accepts(&event("github", "push")));

        let catch_all = EventFilter::any().with_event_types(["*"]);
        assert!(catch_all.accepts(&event("github", "anything")));
    }
}
