//! # roomcast-logging
//!
//! Installs the global `tracing` subscriber: an [`EnvFilter`] seeded from
//! configuration (`RUST_LOG` takes precedence) and a human-readable or
//! JSON `fmt` layer on stdout.

#![deny(unsafe_code)]

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Output format for log lines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Pick the format from a `json` flag.
    pub fn from_json_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Pretty }
    }
}

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The configured filter directive did not parse.
    #[error("invalid log filter {directive:?}: {source}")]
    Filter {
        /// The rejected directive.
        directive: String,
        /// Parser error.
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
    /// A global subscriber was already installed.
    #[error("failed to install tracing subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Build the filter: `RUST_LOG` if set and valid, otherwise `default_directive`.
pub fn build_filter(default_directive: &str) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(default_directive).map_err(|source| LoggingError::Filter {
        directive: default_directive.to_string(),
        source,
    })
}

/// Install the global subscriber. Call once at startup.
pub fn init_subscriber(default_directive: &str, format: LogFormat) -> Result<(), LoggingError> {
    let filter = build_filter(default_directive)?;

    let fmt_layer = match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_filter(filter)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_filter(filter)
            .boxed(),
    };

    tracing_subscriber::registry().with(fmt_layer).try_init()?;
    tracing::debug!(directive = default_directive, ?format, "tracing subscriber installed");
    Ok(())
}
