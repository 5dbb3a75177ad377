//! JSON-over-HTTP delivery shared by the handlers.

use std::time::Duration;

use dispatch::{HandlerError, WebhookEvent};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

/// Default per-request timeout for downstream calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Header carrying a fresh identifier for each outbound request.
pub const DELIVERY_HEADER: &str = "x-hookline-delivery";

/// Header carrying the identifier of the inbound event that caused the request.
pub const EVENT_HEADER: &str = "x-hookline-event";

/// Longest upstream response body kept in an error message.
const MAX_ERROR_BODY: usize = 512;

/// A downstream endpoint that accepts JSON `POST`s.
#[derive(Debug, Clone)]
pub struct HttpSink {
    url: String,
    /// HTTP client (reused for connection pooling)
    client: Client,
    timeout: Duration,
}

impl HttpSink {
    /// Creates a sink targeting `url` with its own client.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: Client::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Shares an existing client (and its connection pool).
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Target URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// `POST`s `body` and maps any non-2xx answer to
    /// [`HandlerError::UpstreamStatus`].
    pub async fn post_json(&self, event: &WebhookEvent, body: &Value) -> Result<(), HandlerError> {
        let delivery = Uuid::new_v4();
        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .header(DELIVERY_HEADER, delivery.to_string())
            .header(EVENT_HEADER, event.id.as_str())
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            debug!(url = %self.url, %delivery, status = status.as_u16(), "Downstream accepted request");
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        Err(HandlerError::UpstreamStatus {
            status: status.as_u16(),
            body: truncate(text, MAX_ERROR_BODY),
        })
    }
}

fn transport_error(error: reqwest::Error) -> HandlerError {
    if error.is_timeout() {
        HandlerError::Transport(format!("request timed out: {error}"))
    } else {
        HandlerError::Transport(error.to_string())
    }
}

fn truncate(mut text: String, max: usize) -> String {
    if text.len() > max {
        let mut cut = max;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push('…');
    }
    text
}
