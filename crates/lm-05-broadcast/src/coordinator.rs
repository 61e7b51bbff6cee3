//! # Broadcast Coordinator
//!
//! One task per network, one aggregator awaiting their verdicts. The
//! aggregator owns the decision; the tasks own the per-network status map
//! and outlive the decision if their network is slow.

use crate::network::{NetworkClient, NetworkError};
use parking_lot::RwLock;
use shared_types::{BreakerRegistry, BroadcastConfig, CircuitBreaker, EventEnvelope, NetworkConfig};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, info, warn};

/// Where one network's submission currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkStatus {
    /// Not yet submitted.
    Pending,
    /// Submitted, awaiting confirmation depth.
    Submitted {
        /// Network-local submission id.
        submission_id: String,
    },
    /// Confirmed at or beyond the network's threshold.
    Confirmed {
        /// Network-local submission id.
        submission_id: String,
        /// Depth observed when the threshold was crossed.
        confirmations: u64,
    },
    /// Submission or confirmation failed; this network is out.
    Failed {
        /// What went wrong.
        reason: String,
    },
}

/// The broadcast decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastOutcome {
    /// At least `required_successes` networks confirmed.
    Succeeded,
    /// Enough networks failed that the threshold is unreachable.
    Failed,
}

/// Errors raised before any network is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BroadcastError {
    /// The threshold cannot be satisfied by the configured networks.
    #[error("Infeasible threshold: {required} successes required, {networks} networks configured")]
    InfeasibleThreshold {
        /// Requested success count.
        required: usize,
        /// Networks available.
        networks: usize,
    },
}

/// Decision plus a live view of per-network progress.
pub struct BroadcastHandle {
    /// The early-resolved decision.
    pub outcome: BroadcastOutcome,
    statuses: Arc<RwLock<HashMap<String, NetworkStatus>>>,
}

impl BroadcastHandle {
    /// Snapshot of every network's status. Laggard networks keep updating
    /// this after the decision.
    #[must_use]
    pub fn statuses(&self) -> HashMap<String, NetworkStatus> {
        self.statuses.read().clone()
    }
}

/// Fans one envelope out to every configured network.
pub struct BroadcastCoordinator {
    clients: HashMap<String, Arc<dyn NetworkClient>>,
    config: BroadcastConfig,
    breakers: Arc<BreakerRegistry>,
}

impl BroadcastCoordinator {
    /// Create a coordinator with no networks attached.
    #[must_use]
    pub fn new(config: BroadcastConfig, breakers: Arc<BreakerRegistry>) -> Self {
        Self {
            clients: HashMap::new(),
            config,
            breakers,
        }
    }

    /// Attach a network client under the given id.
    #[must_use]
    pub fn with_network(mut self, id: impl Into<String>, client: Arc<dyn NetworkClient>) -> Self {
        self.clients.insert(id.into(), client);
        self
    }

    /// Networks currently attached.
    #[must_use]
    pub fn network_count(&self) -> usize {
        self.clients.len()
    }

    /// Broadcast to every network; resolve once `required_successes`
    /// confirmations arrive, once they provably cannot arrive, or once the
    /// deadline passes, whichever comes first.
    pub async fn broadcast(
        &self,
        envelope: EventEnvelope,
        required_successes: usize,
        deadline: Duration,
    ) -> Result<BroadcastHandle, BroadcastError> {
        let total = self.clients.len();
        if required_successes == 0 || required_successes > total {
            return Err(BroadcastError::InfeasibleThreshold {
                required: required_successes,
                networks: total,
            });
        }

        let statuses: Arc<RwLock<HashMap<String, NetworkStatus>>> = Arc::new(RwLock::new(
            self.clients
                .keys()
                .map(|id| (id.clone(), NetworkStatus::Pending))
                .collect(),
        ));
        let (tx, mut rx) = mpsc::unbounded_channel::<bool>();

        let deadline_at = Instant::now() + deadline;
        // Laggards get one extra deadline past resolution to record late
        // results, then give up; no task outlives the job indefinitely.
        let cutoff = deadline_at + deadline;

        for (id, client) in &self.clients {
            tokio::spawn(run_network(
                id.clone(),
                client.clone(),
                self.config.network(id),
                self.breakers.breaker_for(id),
                envelope.clone(),
                statuses.clone(),
                tx.clone(),
                cutoff,
            ));
        }
        drop(tx);

        let mut successes = 0usize;
        let mut failures = 0usize;
        let outcome = loop {
            match timeout_at(deadline_at, rx.recv()).await {
                Ok(Some(true)) => {
                    successes += 1;
                    if successes >= required_successes {
                        break BroadcastOutcome::Succeeded;
                    }
                }
                Ok(Some(false)) => {
                    failures += 1;
                    if failures > total - required_successes {
                        break BroadcastOutcome::Failed;
                    }
                }
                // Every task reported without crossing either threshold;
                // unreachable given the two break conditions above.
                Ok(None) => break BroadcastOutcome::Failed,
                Err(_) => {
                    warn!(
                        correlation_id = %envelope.correlation_id(),
                        successes,
                        required = required_successes,
                        "Broadcast deadline passed"
                    );
                    break BroadcastOutcome::Failed;
                }
            }
        };

        match outcome {
            BroadcastOutcome::Succeeded => info!(
                correlation_id = %envelope.correlation_id(),
                successes,
                required = required_successes,
                networks = total,
                "Broadcast threshold met"
            ),
            BroadcastOutcome::Failed => warn!(
                correlation_id = %envelope.correlation_id(),
                failures,
                required = required_successes,
                networks = total,
                "Broadcast threshold unreachable"
            ),
        }

        Ok(BroadcastHandle { outcome, statuses })
    }
}

fn set_status(
    statuses: &RwLock<HashMap<String, NetworkStatus>>,
    id: &str,
    status: NetworkStatus,
) {
    statuses.write().insert(id.to_string(), status);
}

#[allow(clippy::too_many_arguments)]
async fn run_network(
    id: String,
    client: Arc<dyn NetworkClient>,
    net_config: NetworkConfig,
    breaker: Arc<CircuitBreaker>,
    envelope: EventEnvelope,
    statuses: Arc<RwLock<HashMap<String, NetworkStatus>>>,
    verdict: mpsc::UnboundedSender<bool>,
    cutoff: Instant,
) {
    if !breaker.should_allow() {
        warn!(network = %id, "Skipping network: circuit open");
        set_status(&statuses, &id, NetworkStatus::Failed {
            reason: "circuit open".to_string(),
        });
        let _ = verdict.send(false);
        return;
    }

    let submission_id = match timeout_at(cutoff, client.submit(&envelope)).await {
        Ok(Ok(submission_id)) => {
            set_status(&statuses, &id, NetworkStatus::Submitted {
                submission_id: submission_id.clone(),
            });
            debug!(network = %id, submission_id = %submission_id, "Submitted");
            submission_id
        }
        Ok(Err(e)) => {
            breaker.record_failure();
            warn!(network = %id, error = %e, "Submission failed");
            set_status(&statuses, &id, NetworkStatus::Failed {
                reason: e.to_string(),
            });
            let _ = verdict.send(false);
            return;
        }
        Err(_) => {
            give_up(&id, &statuses, &verdict);
            return;
        }
    };

    loop {
        if Instant::now() >= cutoff {
            give_up(&id, &statuses, &verdict);
            return;
        }
        match timeout_at(cutoff, client.confirmations(&submission_id)).await {
            Ok(Ok(depth)) if depth >= net_config.confirmation_threshold => {
                breaker.record_success();
                debug!(network = %id, confirmations = depth, "Confirmed");
                set_status(&statuses, &id, NetworkStatus::Confirmed {
                    submission_id,
                    confirmations: depth,
                });
                let _ = verdict.send(true);
                return;
            }
            Ok(Ok(_)) => sleep(net_config.poll_interval).await,
            Ok(Err(e @ NetworkError::Unreachable(_))) => {
                // One missed poll is not a lost submission; try again.
                debug!(network = %id, error = %e, "Confirmation poll failed; retrying");
                sleep(net_config.poll_interval).await;
            }
            Ok(Err(e)) => {
                breaker.record_failure();
                warn!(network = %id, error = %e, "Confirmation failed");
                set_status(&statuses, &id, NetworkStatus::Failed {
                    reason: e.to_string(),
                });
                let _ = verdict.send(false);
                return;
            }
            Err(_) => {
                give_up(&id, &statuses, &verdict);
                return;
            }
        }
    }
}

fn give_up(
    id: &str,
    statuses: &RwLock<HashMap<String, NetworkStatus>>,
    verdict: &mpsc::UnboundedSender<bool>,
) {
    warn!(network = %id, "Network missed the broadcast cutoff");
    set_status(statuses, id, NetworkStatus::Failed {
        reason: "deadline passed".to_string(),
    });
    let _ = verdict.send(false);
}
