//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for logging and metrics.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to every log line.
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON-formatted logs instead of human-readable ones.
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "ledger-mesh".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// - `LM_SERVICE_NAME`: service name (default: ledger-mesh)
    /// - `LM_LOG_LEVEL`: log level filter (default: info)
    /// - `LM_JSON_LOGS`: `1`/`true` for JSON output (default: off)
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            service_name: env::var("LM_SERVICE_NAME").unwrap_or(defaults.service_name),
            log_level: env::var("LM_LOG_LEVEL").unwrap_or(defaults.log_level),
            json_logs: env::var("LM_JSON_LOGS")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.json_logs),
        }
    }
}
