//! # Shared Error Taxonomy
//!
//! The consumer-facing half of the failure taxonomy. Transient failures are
//! resolved locally with retry/backoff and never cross the consumer-host
//! boundary; permanent failures dead-letter immediately.

use thiserror::Error;

/// Failure reported by an event handler.
///
/// The consumer host redelivers `Transient` failures with backoff up to the
/// configured retry limit, then dead-letters. `Permanent` failures
/// dead-letter immediately without redelivery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// Retryable failure (downstream hiccup, lock contention, timeout).
    #[error("Transient handler failure: {0}")]
    Transient(String),

    /// Non-retryable failure (malformed payload, business rule rejection).
    #[error("Permanent handler failure: {0}")]
    Permanent(String),
}

impl HandlerError {
    /// Shorthand for a transient failure.
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient(reason.into())
    }

    /// Shorthand for a permanent failure.
    pub fn permanent(reason: impl Into<String>) -> Self {
        Self::Permanent(reason.into())
    }

    /// Whether the host should redeliver.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
