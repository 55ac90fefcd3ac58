// src/observability.rs
//! Logging and metrics setup for the engine binary

use crate::utils::config::LoggingConfig;
use crate::utils::errors::{EngineError, Result};
use metrics::describe_counter;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over `config.level` when set.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| EngineError::Config(format!("Invalid log filter {:?}: {}", config.level, e)))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| EngineError::Config(format!("Failed to install tracing subscriber: {}", e)))
}

/// Register descriptions for the counters the pipeline emits
pub fn init_metrics() {
    describe_counter!(
        "keytrace_sessions_started_total",
        "Recording sessions opened against the session store"
    );
    describe_counter!(
        "keytrace_events_uploaded_total",
        "Encrypted events accepted by the session store"
    );
    describe_counter!(
        "keytrace_batches_uploaded_total",
        "Event batches uploaded successfully"
    );
    describe_counter!(
        "keytrace_batches_failed_total",
        "Event batches dropped after exhausting retries"
    );
    describe_counter!(
        "keytrace_events_dropped_total",
        "Events lost to a full queue, failed batches or flush timeouts"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_filter() {
        // Only meaningful when RUST_LOG does not override the configured level
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = LoggingConfig {
            level: "keytrace=loudest".into(),
            json: false,
        };
        assert!(matches!(init_tracing(&config), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_describing_metrics_without_recorder() {
        init_metrics();
    }
}
