//! # Mesh Telemetry
//!
//! Logging and metrics plumbing shared by every mesh service.
//!
//! - **Logs**: structured `tracing` output, console or JSON, filtered by
//!   `LM_LOG_LEVEL`
//! - **Metrics**: Prometheus counters/histograms in a crate-global registry,
//!   rendered in text exposition format by [`render_metrics`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mesh_telemetry::{TelemetryConfig, init_logging};
//!
//! fn main() {
//!     let config = TelemetryConfig::from_env();
//!     init_logging(&config).expect("telemetry init");
//! }
//! ```

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod config;
mod logging;
mod metrics;

pub use config::TelemetryConfig;
pub use logging::{init_for_tests, init_logging};
pub use metrics::{
    render_metrics, BROADCAST_OUTCOMES, CIRCUIT_TRANSITIONS, EVENTS_DEAD_LETTERED,
    EVENTS_PROCESSED, EVENTS_PUBLISHED, EVENTS_REJECTED, HANDLER_DURATION, REGISTRY,
    SAGA_OUTCOMES,
};

use thiserror::Error;

/// Telemetry initialization errors.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The tracing subscriber was already installed or misconfigured.
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    /// Metric rendering failed.
    #[error("Failed to render metrics: {0}")]
    MetricsRender(String),
}
