//! # Network Client Port
//!
//! One client per settlement network. Submission returns a network-local
//! submission id; confirmation depth is polled separately because networks
//! confirm at wildly different speeds.

use async_trait::async_trait;
use shared_types::EventEnvelope;
use thiserror::Error;

/// Errors from a settlement network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// The network rejected the submission outright.
    #[error("Submission rejected: {0}")]
    Rejected(String),

    /// The network is unreachable or the submission was lost.
    #[error("Network unreachable: {0}")]
    Unreachable(String),
}

/// Port to one settlement network.
#[async_trait]
pub trait NetworkClient: Send + Sync {
    /// Submit the envelope. Returns the network-local submission id used
    /// for confirmation polling.
    async fn submit(&self, envelope: &EventEnvelope) -> Result<String, NetworkError>;

    /// Current confirmation depth of a submission.
    async fn confirmations(&self, submission_id: &str) -> Result<u64, NetworkError>;
}

/// Scriptable client for tests and single-node runs: confirmations grow by
/// a fixed amount per poll, and submission can be made slow or rejecting.
pub struct MockNetworkClient {
    reject: Option<String>,
    confirmations_per_poll: u64,
    submit_delay: std::time::Duration,
    polls: std::sync::atomic::AtomicU64,
}

impl MockNetworkClient {
    /// Confirms one block deeper on every poll.
    #[must_use]
    pub fn confirming() -> Self {
        Self {
            reject: None,
            confirmations_per_poll: 1,
            submit_delay: std::time::Duration::ZERO,
            polls: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Rejects every submission with the given reason.
    #[must_use]
    pub fn rejecting(reason: impl Into<String>) -> Self {
        Self {
            reject: Some(reason.into()),
            ..Self::confirming()
        }
    }

    /// Confirms, but only after `delay` has passed at submission time.
    #[must_use]
    pub fn slow(delay: std::time::Duration) -> Self {
        Self {
            submit_delay: delay,
            ..Self::confirming()
        }
    }
}

#[async_trait]
impl NetworkClient for MockNetworkClient {
    async fn submit(&self, _envelope: &EventEnvelope) -> Result<String, NetworkError> {
        if !self.submit_delay.is_zero() {
            tokio::time::sleep(self.submit_delay).await;
        }
        match &self.reject {
            Some(reason) => Err(NetworkError::Rejected(reason.clone())),
            None => Ok(uuid::Uuid::new_v4().to_string()),
        }
    }

    async fn confirmations(&self, _submission_id: &str) -> Result<u64, NetworkError> {
        let polls = self
            .polls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
            + 1;
        Ok(polls * self.confirmations_per_poll)
    }
}
