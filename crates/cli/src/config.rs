//! Configuration for the `hookline` binary.
//!
//! Loaded from a TOML file with `${VAR}` environment substitution applied
//! before parsing, so secrets and URLs can stay out of the file itself.
//!
//! ```toml
//! [dedup]
//! ttl_ms = 300000
//!
//! [dispatch]
//! handler_timeout_ms = 15000
//!
//! [secrets]
//! github = "${GITHUB_WEBHOOK_SECRET}"
//!
//! [[handlers]]
//! kind = "ci_trigger"
//! name = "ci"
//! url = "https://ci.example.com/hooks/build"
//! branches = ["main"]
//!
//! [[handlers]]
//! kind = "chat"
//! name = "team-chat"
//! url = "${CHAT_WEBHOOK_URL}"
//! format = "slack"
//!
//! [telemetry]
//! otlp_endpoint = "http://localhost:4317"
//! ```
//!
//! Handlers are registered in the order they appear, which is also the order
//! they execute and report in.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use dispatch::{Dispatcher, DispatcherConfig, EventSource, Handler, DEFAULT_DEDUP_TTL};
use handlers::{
    ChatFormat, ChatNotifier, CiTriggerHandler, Client, EventFilter, HttpSink,
    PullRequestReviewNotifier,
};
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Environment variable that overrides the configuration path.
pub const CONFIG_ENV_VAR: &str = "HOOKLINE_CONFIG";

/// Configuration path used when neither `--config` nor the environment names one.
pub const DEFAULT_CONFIG_PATH: &str = "hookline.toml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// Root configuration structure.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct HooklineConfig {
    #[serde(default)]
    pub dedup: DedupConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Event source -> shared secret.
    #[serde(default)]
    pub secrets: BTreeMap<String, String>,

    /// Handlers in registration order.
    #[serde(default)]
    pub handlers: Vec<HandlerConfig>,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DedupConfig {
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_ttl_ms(),
        }
    }
}

fn default_ttl_ms() -> u64 {
    DEFAULT_DEDUP_TTL.as_millis() as u64
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DispatchConfig {
    /// Per-handler deadline; absent means none.
    #[serde(default)]
    pub handler_timeout_ms: Option<u64>,
}

/// Which handler implementation a `[[handlers]]` entry builds.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    CiTrigger,
    PrReview,
    Chat,
}

impl HandlerKind {
    fn default_event_types(self) -> &'static [&'static str] {
        match self {
            Self::CiTrigger => &["push"],
            Self::PrReview => &["pull_request"],
            Self::Chat => &[],
        }
    }
}

/// One `[[handlers]]` entry.
#[derive(Debug, Deserialize, Clone)]
pub struct HandlerConfig {
    pub kind: HandlerKind,
    pub name: String,
    pub url: String,

    /// Accepted sources; empty accepts any.
    #[serde(default)]
    pub sources: Vec<String>,

    /// Accepted event-type patterns; empty uses the handler's default.
    #[serde(default)]
    pub event_types: Vec<String>,

    /// Per-request timeout for the downstream call.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// `ci_trigger` only: watched branches; empty watches all.
    #[serde(default)]
    pub branches: Vec<String>,

    /// `pr_review` only: actions that request review.
    #[serde(default)]
    pub actions: Option<Vec<String>>,

    /// `chat` only: `"plain"` (default) or `"slack"`.
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    /// OTLP gRPC endpoint; tracing is exported only when set.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            service_name: default_service_name(),
        }
    }
}

fn default_service_name() -> String {
    "hookline".to_string()
}

// ---------------------------------------------------------------------------
// Loading and validation
// ---------------------------------------------------------------------------

impl HooklineConfig {
    /// Load configuration from a specific path.
    ///
    /// A missing file yields the defaults: no secrets and no handlers, so
    /// every event is rejected.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        info!(path = %path.display(), "Loading configuration");
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate configuration text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let content = substitute_env_vars(content);
        let config: HooklineConfig = toml::from_str(&content)?;
        config.validate()?;

        info!(
            secrets = config.secrets.len(),
            handlers = config.handlers.len(),
            dedup_ttl_ms = config.dedup.ttl_ms,
            "Configuration loaded"
        );
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.dedup.ttl_ms == 0 {
            return Err(ConfigError::Validation("dedup.ttl_ms must be positive".into()));
        }
        if self.dispatch.handler_timeout_ms == Some(0) {
            return Err(ConfigError::Validation(
                "dispatch.handler_timeout_ms must be positive".into(),
            ));
        }

        for (source, secret) in &self.secrets {
            if source.is_empty() {
                return Err(ConfigError::Validation("secret source must not be empty".into()));
            }
            if secret.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "secret for source '{source}' is empty"
                )));
            }
            if secret.contains("${") {
                return Err(ConfigError::Validation(format!(
                    "secret for source '{source}' contains an unsubstituted environment variable"
                )));
            }
        }

        let mut names = HashSet::new();
        for handler in &self.handlers {
            if handler.name.is_empty() {
                return Err(ConfigError::Validation("handler name must not be empty".into()));
            }
            if !names.insert(handler.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate handler name '{}'",
                    handler.name
                )));
            }
            if !handler.url.starts_with("http://") && !handler.url.starts_with("https://") {
                return Err(ConfigError::Validation(format!(
                    "handler '{}' URL must start with http:// or https://",
                    handler.name
                )));
            }
            if let Some(format) = &handler.format {
                format
                    .parse::<ChatFormat>()
                    .map_err(|e| ConfigError::Validation(format!("handler '{}': {e}", handler.name)))?;
            }
            handler.warn_on_foreign_keys();
        }

        Ok(())
    }

    /// Dispatcher tunables from the `[dedup]` and `[dispatch]` sections.
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            dedup_ttl: Duration::from_millis(self.dedup.ttl_ms),
            handler_timeout: self.dispatch.handler_timeout_ms.map(Duration::from_millis),
        }
    }

    /// Build a fully wired [`Dispatcher`]: secrets bound and handlers
    /// registered in configuration order, all sharing `client`.
    pub fn build_dispatcher(&self, client: &Client) -> Result<Dispatcher, ConfigError> {
        let dispatcher = Dispatcher::new(self.dispatcher_config());

        for (source, secret) in &self.secrets {
            let source = EventSource::new(source.as_str())
                .ok_or_else(|| ConfigError::Validation("secret source must not be empty".into()))?;
            dispatcher.register_secret(source, secret.as_str());
        }

        for handler in &self.handlers {
            dispatcher.register_handler(handler.build(client)?);
        }

        debug!(handlers = ?dispatcher.handler_names(), "Dispatcher wired");
        Ok(dispatcher)
    }
}

impl HandlerConfig {
    fn warn_on_foreign_keys(&self) {
        let foreign = match self.kind {
            HandlerKind::CiTrigger => self.actions.is_some() || self.format.is_some(),
            HandlerKind::PrReview => !self.branches.is_empty() || self.format.is_some(),
            HandlerKind::Chat => !self.branches.is_empty() || self.actions.is_some(),
        };
        if foreign {
            warn!(
                handler = %self.name,
                kind = ?self.kind,
                "Handler entry sets keys that do not apply to its kind; they are ignored"
            );
        }
    }

    fn filter(&self) -> EventFilter {
        let filter = EventFilter::any().with_sources(self.sources.iter().cloned());
        if self.event_types.is_empty() {
            filter.with_event_types(self.kind.default_event_types().iter().copied())
        } else {
            filter.with_event_types(self.event_types.iter().cloned())
        }
    }

    fn sink(&self, client: &Client) -> HttpSink {
        let sink = HttpSink::new(self.url.as_str()).with_client(client.clone());
        match self.timeout_ms {
            Some(ms) => sink.with_timeout(Duration::from_millis(ms)),
            None => sink,
        }
    }

    fn build(&self, client: &Client) -> Result<Arc<dyn Handler>, ConfigError> {
        let sink = self.sink(client);
        let handler: Arc<dyn Handler> = match self.kind {
            HandlerKind::CiTrigger => Arc::new(
                CiTriggerHandler::new(self.name.as_str(), sink)
                    .with_filter(self.filter())
                    .with_branches(self.branches.iter().cloned()),
            ),
            HandlerKind::PrReview => {
                let notifier = PullRequestReviewNotifier::new(self.name.as_str(), sink)
                    .with_filter(self.filter());
                match &self.actions {
                    Some(actions) => Arc::new(notifier.with_actions(actions.iter().cloned())),
                    None => Arc::new(notifier),
                }
            }
            HandlerKind::Chat => {
                let format = match &self.format {
                    Some(format) => format.parse::<ChatFormat>().map_err(ConfigError::Validation)?,
                    None => ChatFormat::default(),
                };
                Arc::new(
                    ChatNotifier::new(self.name.as_str(), sink)
                        .with_filter(self.filter())
                        .with_format(format),
                )
            }
        };
        Ok(handler)
    }
}

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("environment variable pattern is valid")
});

/// Substitute environment variables in the format `${VAR_NAME}`.
///
/// Unset variables keep their placeholder so validation can report them.
fn substitute_env_vars(content: &str) -> String {
    ENV_VAR_PATTERN
        .replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    debug!(var = %var_name, "Environment variable not set, keeping placeholder");
                    caps[0].to_string()
                }
            }
        })
        .to_string()
}
