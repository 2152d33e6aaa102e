//! Observability: structured logging and Prometheus metrics.
//!
//! Logs go to stderr so stdout stays free for command output. The log filter
//! is read from `GRAPHREC_LOG`, then `RUST_LOG`, then the configured level.

mod metrics;

pub use metrics::{MetricsHandle, install_prometheus};

use crate::config::{GraphrecConfig, LogFormat, LoggingConfig};
use crate::{Error, Result};
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Environment variable holding the log filter directive.
pub const LOG_ENV: &str = "GRAPHREC_LOG";

static OBSERVABILITY_INIT: OnceLock<()> = OnceLock::new();

/// Options for initialization.
#[derive(Debug, Clone, Copy, Default)]
pub struct InitOptions {
    /// Raise the default level to `debug`.
    pub verbose: bool,
}

/// Handle for observability runtime components.
///
/// Keep it alive for the lifetime of the process.
pub struct ObservabilityHandle {
    metrics: Option<MetricsHandle>,
}

impl ObservabilityHandle {
    /// The Prometheus handle, when metrics are enabled.
    #[must_use]
    pub const fn metrics(&self) -> Option<&MetricsHandle> {
        self.metrics.as_ref()
    }
}

/// Builds the log filter from the environment or `default_level`.
#[must_use]
pub fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig, options: InitOptions) -> Result<()> {
    let level = if options.verbose {
        "debug"
    } else {
        config.level.as_str()
    };
    let filter = build_filter(level);

    match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true)
                    .with_thread_names(true),
            )
            .with(filter)
            .try_init()
            .map_err(init_error),
        LogFormat::Text => tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .with(filter)
            .try_init()
            .map_err(init_error),
    }
}

/// Initializes logging and, when enabled, the Prometheus exporter.
///
/// # Errors
///
/// Returns an error if called twice or if the exporter cannot bind.
pub fn init(config: &GraphrecConfig, options: InitOptions) -> Result<ObservabilityHandle> {
    if OBSERVABILITY_INIT.get().is_some() {
        return Err(Error::operation(
            "observability_init",
            "observability already initialized",
        ));
    }

    init_logging(&config.logging, options)?;
    let metrics = install_prometheus(&config.metrics)?;

    let _ = OBSERVABILITY_INIT.set(());
    tracing::debug!(
        format = ?config.logging.format,
        metrics = config.metrics.enabled,
        "Observability initialized"
    );
    Ok(ObservabilityHandle { metrics })
}

#[allow(clippy::needless_pass_by_value)]
fn init_error(e: tracing_subscriber::util::TryInitError) -> Error {
    Error::operation("observability_init", e)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_uses_default_level() {
        // Holds whatever the environment says; only checks construction.
        let filter = build_filter("warn");
        assert!(!filter.to_string().is_empty());
    }

    #[test]
    fn test_second_subscriber_install_fails() {
        let config = LoggingConfig::default();
        let first = init_logging(&config, InitOptions::default());
        let second = init_logging(&config, InitOptions::default());
        // Another test may have installed one first; at most one succeeds.
        assert!(first.is_err() || second.is_err());
    }
}
