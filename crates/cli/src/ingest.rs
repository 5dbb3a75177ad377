//! Newline-delimited event ingestion.
//!
//! Each input line is one JSON [`WebhookEvent`]. Each output line is the
//! [`WebhookResponse`] for the matching input line, or an error object when
//! the line could not be parsed. Events are dispatched one at a time, in
//! input order.

use dispatch::{DispatchStatus, Dispatcher, WebhookEvent, WebhookResponse};
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

/// Outcome counts for one ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub accepted: usize,
    pub rejected: usize,
    pub errors: usize,
    pub malformed: usize,
}

impl IngestSummary {
    fn record(&mut self, response: &WebhookResponse) {
        match response.status {
            DispatchStatus::Accepted => self.accepted += 1,
            DispatchStatus::Rejected => self.rejected += 1,
            DispatchStatus::Error => self.errors += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.accepted + self.rejected + self.errors + self.malformed
    }
}

/// Output line for input that is not a valid event.
#[derive(Debug, Serialize)]
struct MalformedLine {
    status: DispatchStatus,
    line: usize,
    error: String,
}

/// Dispatch every event read from `reader`, writing one response line per
/// non-blank input line to `writer`.
///
/// Malformed lines are reported and skipped; only I/O failures abort.
pub async fn run<R, W>(
    dispatcher: &Dispatcher,
    reader: R,
    mut writer: W,
) -> anyhow::Result<IngestSummary>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut summary = IngestSummary::default();
    let mut lines = reader.lines();
    let mut line_no = 0;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let output = match serde_json::from_str::<WebhookEvent>(line) {
            Ok(event) => {
                let response = dispatcher.dispatch(event).await;
                summary.record(&response);
                serde_json::to_string(&response)?
            }
            Err(e) => {
                warn!(line = line_no, error = %e, "Skipping malformed event");
                summary.malformed += 1;
                serde_json::to_string(&MalformedLine {
                    status: DispatchStatus::Error,
                    line: line_no,
                    error: format!("malformed event: {e}"),
                })?
            }
        };

        writer.write_all(output.as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }
    writer.flush().await?;

    info!(
        accepted = summary.accepted,
        rejected = summary.rejected,
        errors = summary.errors,
        malformed = summary.malformed,
        "Input exhausted"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch::{EventId, EventSource, EventType, Payload};
    use serde_json::{json, Value};

    const SECRET: &str = "ingest-secret";

    fn dispatcher() -> Dispatcher {
        let dispatcher = Dispatcher::default();
        dispatcher.register_secret(EventSource::new("github").unwrap(), SECRET);
        dispatcher
    }

    fn event_line(id: &str, signed: bool) -> String {
        let mut payload = Payload::new();
        payload.insert("action".into(), json!("opened"));
        let event = WebhookEvent::new(
            EventId::new(id).unwrap(),
            EventSource::new("github").unwrap(),
            EventType::new("push").unwrap(),
            payload,
        );
        let event = if signed { event.signed_with(SECRET) } else { event };
        serde_json::to_string(&event).unwrap()
    }

    fn output_lines(output: &[u8]) -> Vec<Value> {
        std::str::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_one_response_per_event_in_input_order() {
        let dispatcher = dispatcher();
        let input = format!(
            "{}\n\n{}\n{}\n",
            event_line("a", false),
            event_line("b", true),
            event_line("b", true),
        );
        let mut output = Vec::new();

        let summary = run(&dispatcher, input.as_bytes(), &mut output).await.unwrap();

        let lines = output_lines(&output);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["eventId"], "a");
        assert_eq!(lines[0]["status"], "rejected");
        // No handlers registered, so the signed event is unroutable.
        assert_eq!(lines[1]["status"], "error");
        assert_eq!(lines[2]["status"], "accepted");

        assert_eq!(
            summary,
            IngestSummary {
                accepted: 1,
                rejected: 1,
                errors: 1,
                malformed: 0,
            }
        );
        assert_eq!(dispatcher.dead_letter_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_line_does_not_abort() {
        let dispatcher = dispatcher();
        let input = format!("{{not json\n{}\n", event_line("c", false));
        let mut output = Vec::new();

        let summary = run(&dispatcher, input.as_bytes(), &mut output).await.unwrap();

        let lines = output_lines(&output);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["status"], "error");
        assert_eq!(lines[0]["line"], 1);
        assert!(lines[0]["error"].as_str().unwrap().starts_with("malformed event"));
        assert_eq!(lines[1]["status"], "rejected");
        assert_eq!(summary.malformed, 1);
        assert_eq!(summary.total(), 2);
    }

    #[tokio::test]
    async fn test_empty_event_id_is_malformed() {
        let dispatcher = dispatcher();
        let line = r#"{"id":"","source":"github","type":"push","payload":{},"timestamp":"2025-06-01T12:00:00Z"}"#;
        let mut output = Vec::new();

        let summary = run(&dispatcher, line.as_bytes(), &mut output).await.unwrap();

        let lines = output_lines(&output);
        assert_eq!(lines[0]["status"], "error");
        assert!(lines[0]["error"].as_str().unwrap().contains("EventId must not be empty"));
        assert_eq!(summary.malformed, 1);
    }

    #[tokio::test]
    async fn test_empty_input_writes_nothing() {
        let mut output = Vec::new();
        let summary = run(&dispatcher(), &b""[..], &mut output).await.unwrap();
        assert!(output.is_empty());
        assert_eq!(summary.total(), 0);
    }
}
