//! Hookline CLI entry point.
//!
//! This binary is the composition root for the workspace. Responsibilities:
//!
//! 1. **Parse configuration** — load `hookline.toml` (or the file named by
//!    `--config` / `HOOKLINE_CONFIG`) and validate it.
//! 2. **Wire observability** — install a JSON `tracing-subscriber` layer on
//!    stderr and, when configured, an OpenTelemetry OTLP exporter.
//! 3. **Construct infrastructure** — build one shared HTTP client, the
//!    configured handlers, and the [`dispatch::Dispatcher`] they register with.
//! 4. **Run the selected command**:
//!    - `dispatch` — read newline-delimited events and print one response per
//!      event; dead letters are drained at end of input.
//!    - `sign` — print the signature a sender would attach to a payload.

mod config;
mod ingest;
mod telemetry;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use dispatch::{sign_payload, Dispatcher, Payload};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncReadExt, AsyncWrite, BufReader};
use tracing::{info, warn};

use crate::config::{HooklineConfig, CONFIG_ENV_VAR, DEFAULT_CONFIG_PATH};

#[derive(Debug, Parser)]
#[command(name = "hookline", version, about = "Webhook ingestion and dispatch")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, env = CONFIG_ENV_VAR, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Dispatch newline-delimited JSON events and print a response per event.
    Dispatch {
        /// Read events from this file instead of stdin.
        #[arg(long)]
        input: Option<PathBuf>,

        /// Write dead-lettered events to this file as NDJSON.
        #[arg(long)]
        dead_letters: Option<PathBuf>,
    },

    /// Print the `sha256=` signature for a JSON payload object.
    Sign {
        /// Shared secret for the event source.
        #[arg(long, env = "HOOKLINE_SECRET", hide_env_values = true)]
        secret: String,

        /// Payload JSON; read from stdin when omitted.
        #[arg(long)]
        payload: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Sign { secret, payload } => sign(&secret, payload).await,
        Command::Dispatch {
            input,
            dead_letters,
        } => {
            let config = telemetry::bootstrap(|| HooklineConfig::load_from(&cli.config))
                .with_context(|| format!("loading {}", cli.config.display()))?;
            let _telemetry = telemetry::init(&config.telemetry)?;

            let dispatcher = config
                .build_dispatcher(&handlers::Client::new())
                .context("building dispatcher")?;
            info!(handlers = ?dispatcher.handler_names(), "Hookline ready");

            let dead_letters = dead_letters.as_deref();
            let stdout = tokio::io::stdout();
            match input {
                Some(path) => {
                    let file = tokio::fs::File::open(&path)
                        .await
                        .with_context(|| format!("opening {}", path.display()))?;
                    dispatch_and_flush(&dispatcher, BufReader::new(file), stdout, dead_letters)
                        .await
                }
                None => {
                    let stdin = BufReader::new(tokio::io::stdin());
                    dispatch_and_flush(&dispatcher, stdin, stdout, dead_letters).await
                }
            }
        }
    }
}

/// Dispatch all input, then flush dead letters even if ingestion failed
/// part-way through.
async fn dispatch_and_flush<R, W>(
    dispatcher: &Dispatcher,
    reader: R,
    writer: W,
    dead_letters: Option<&Path>,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let dispatched = ingest::run(dispatcher, reader, writer)
        .await
        .map(|summary| info!(events = summary.total(), "Dispatch finished"));
    let flushed = flush_dead_letters(dispatcher, dead_letters).await;
    dispatched.and(flushed)
}

async fn flush_dead_letters(dispatcher: &Dispatcher, path: Option<&Path>) -> anyhow::Result<()> {
    let dead_letters = dispatcher.drain_dead_letters();
    if dead_letters.is_empty() {
        return Ok(());
    }

    for event in &dead_letters {
        warn!(
            event_id = %event.id,
            source = %event.source,
            event_type = %event.event_type,
            "Unroutable event"
        );
    }

    if let Some(path) = path {
        let mut ndjson = String::new();
        for event in &dead_letters {
            ndjson.push_str(&serde_json::to_string(event)?);
            ndjson.push('\n');
        }
        tokio::fs::write(path, ndjson)
            .await
            .with_context(|| format!("writing dead letters to {}", path.display()))?;
        info!(count = dead_letters.len(), path = %path.display(), "Dead letters written");
    }
    Ok(())
}

async fn sign(secret: &str, payload: Option<String>) -> anyhow::Result<()> {
    let raw = match payload {
        Some(raw) => raw,
        None => {
            let mut raw = String::new();
            tokio::io::stdin()
                .read_to_string(&mut raw)
                .await
                .context("reading payload from stdin")?;
            raw
        }
    };

    let payload: Payload = match serde_json::from_str(&raw).context("payload is not valid JSON")? {
        Value::Object(map) => map,
        other => bail!("payload must be a JSON object, got {other}"),
    };

    println!("{}", sign_payload(secret, &payload)?);
    Ok(())
}
