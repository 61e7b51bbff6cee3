//! Structured logging setup on top of `tracing-subscriber`.

use crate::config::TelemetryConfig;
use crate::TelemetryError;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. Call once at process startup.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(&config.log_level)
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = if config.json_logs {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

/// Best-effort subscriber for tests: ignores double-install, honors
/// `LM_LOG_LEVEL` when set.
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("LM_LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}
