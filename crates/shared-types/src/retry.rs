//! # Retry & Backoff
//!
//! A pure backoff-policy function `(attempt) -> delay` plus a generic retry
//! wrapper, independent of any particular I/O call. Callers classify their
//! own errors; the wrapper only schedules.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::debug;

/// Exponential backoff policy: `base * 2^(attempt-1)`, capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay before the second attempt.
    pub base: Duration,
    /// Upper bound on any single delay.
    pub cap: Duration,
    /// Total attempts, including the first.
    pub max_attempts: u32,
}

impl BackoffPolicy {
    /// The transport retry profile mandated for publishing:
    /// base 100ms, cap 5s, max 5 attempts.
    #[must_use]
    pub fn transport() -> Self {
        Self {
            base: Duration::from_millis(100),
            cap: Duration::from_secs(5),
            max_attempts: 5,
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    ///
    /// Pure: same attempt number always yields the same delay.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exp = attempt.saturating_sub(1).min(31);
        let raw = self.base.saturating_mul(1u32 << exp);
        raw.min(self.cap)
    }
}

/// Outcome of an exhausted or aborted retry loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryError<E> {
    /// The operation failed with a non-transient error; no retry attempted.
    #[error("Permanent failure: {0}")]
    Permanent(E),

    /// Every attempt failed with a transient error.
    #[error("Retries exhausted after {attempts} attempts: {last}")]
    Exhausted {
        /// Attempts made, including the first.
        attempts: u32,
        /// The final transient error.
        last: E,
    },
}

impl BackoffPolicy {
    /// Run `op` until it succeeds, a non-transient error occurs, or
    /// `max_attempts` is exhausted. `is_transient` classifies errors.
    pub async fn retry<T, E, F, Fut>(
        &self,
        is_transient: impl Fn(&E) -> bool,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        E: std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !is_transient(&e) => return Err(RetryError::Permanent(e)),
                Err(e) if attempt >= self.max_attempts => {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: e,
                    })
                }
                Err(e) => {
                    let delay = self.delay(attempt);
                    debug!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "Transient failure, backing off");
                    sleep(delay).await;
                }
            }
        }
    }
}
