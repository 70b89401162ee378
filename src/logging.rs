//! Tracing subscriber setup from `[logging]`.
//!
//! `RUST_LOG`, when set, takes precedence over the configured level.

use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

fn writer(output: &str) -> Result<BoxMakeWriter> {
    Ok(match output {
        "stdout" => BoxMakeWriter::new(std::io::stdout),
        "stderr" => BoxMakeWriter::new(std::io::stderr),
        path => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {path}"))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
    })
}

/// Install the global subscriber. Call once, before anything logs.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.level.to_ascii_lowercase()))
        .context("invalid log level")?;

    let to_terminal = matches!(config.output.as_str(), "stdout" | "stderr");
    let layer = match config.format.as_str() {
        "text" => tracing_subscriber::fmt::layer()
            .with_writer(writer(&config.output)?)
            .with_ansi(to_terminal)
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer(&config.output)?)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .context("installing tracing subscriber")?;
    Ok(())
}
