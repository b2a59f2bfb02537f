//! Structured logging system using tracing crate
//!
//! ## Log Format Options
//!
//! The output format is controlled by the `LOG_FORMAT` environment variable:
//!
//! - `json` - Structured JSON format for log aggregation systems
//! - `pretty` - Human-readable format with colors and indentation
//! - `compact` - Terminal-friendly format with minimal spacing (default)
//!
//! ## Verbosity
//!
//! The level comes from the `-d` count: none logs warnings and errors, `-d`
//! adds info, `-dd` adds debug. `RUST_LOG` overrides the filter entirely.
//!
//! ```bash
//! LOG_FORMAT=json ./mqtt-base -t home/state -dd
//! RUST_LOG=mqtt_base=trace ./mqtt-base -t home/state
//! ```

use std::env;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON format for structured logging (machine-readable)
    Json,
    /// Pretty format with colors and indentation (human-readable)
    Pretty,
    /// Compact format with minimal spacing (terminal-friendly)
    Compact,
}

impl LogFormat {
    /// Parse log format from string
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Compact,
        }
    }

    /// Format from `LOG_FORMAT`, compact when unset
    pub fn from_env() -> Self {
        env::var("LOG_FORMAT")
            .map(|format| Self::parse(&format))
            .unwrap_or(LogFormat::Compact)
    }
}

/// Map a `-d` count to a level
pub fn verbosity_level(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    }
}

fn build_filter(level: Level) -> EnvFilter {
    if let Ok(rust_log) = env::var("RUST_LOG") {
        return EnvFilter::new(rust_log);
    }

    let mut filter = EnvFilter::new(level.to_string());
    // Reduce noise from dependencies
    for directive in ["rumqttc=warn", "tokio=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

/// Initialize the global subscriber.
///
/// Logs go to stderr, or are appended to `logfile` without ANSI colors.
/// Returns an error if the log file cannot be opened.
pub fn init_logging(
    verbosity: u8,
    format: LogFormat,
    logfile: Option<&Path>,
) -> Result<(), std::io::Error> {
    let filter = build_filter(verbosity_level(verbosity));
    let subscriber = tracing_subscriber::registry().with(filter);

    let (writer, ansi) = match logfile {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    match format {
        LogFormat::Json => {
            let fmt_layer = fmt::layer().json().with_writer(writer);
            subscriber.with(fmt_layer).init();
        }
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .pretty()
                .with_ansi(ansi)
                .with_writer(writer);
            subscriber.with(fmt_layer).init();
        }
        LogFormat::Compact => {
            let fmt_layer = fmt::layer()
                .compact()
                .with_ansi(ansi)
                .with_target(false)
                .with_writer(writer);
            subscriber.with(fmt_layer).init();
        }
    }
    Ok(())
}
