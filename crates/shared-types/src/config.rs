//! # Component Configuration
//!
//! Explicit configuration structs passed into each component's constructor.
//! There is no ambient/static configuration anywhere in the workspace; a
//! deployment wires these up once at startup.

use crate::retry::BackoffPolicy;
use std::collections::HashMap;
use std::time::Duration;

/// Publisher-side configuration.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Logical bus/topic the publisher deposits onto.
    pub topic: String,
    /// Emitting service name stamped as the envelope source.
    pub source: String,
    /// Transport retry profile.
    pub retry: BackoffPolicy,
}

impl PublisherConfig {
    /// Standard profile for a named service and topic.
    #[must_use]
    pub fn new(source: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            source: source.into(),
            retry: BackoffPolicy::transport(),
        }
    }
}

/// Consumer-host configuration for one bound queue.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Queue this host drains.
    pub queue: String,
    /// Messages processed concurrently.
    pub max_in_flight: usize,
    /// Redeliveries before dead-lettering a transiently failing message.
    pub max_retries: u32,
    /// Long-poll wait per receive call.
    pub poll_wait: Duration,
    /// How long a leased message stays invisible before redelivery.
    pub visibility_timeout: Duration,
    /// Per-message handler budget; exceeding it counts as a transient failure.
    pub handler_timeout: Duration,
    /// Backoff applied between redeliveries of the same message.
    pub redelivery_backoff: BackoffPolicy,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            queue: String::new(),
            max_in_flight: 16,
            max_retries: 5,
            poll_wait: Duration::from_secs(5),
            visibility_timeout: Duration::from_secs(30),
            handler_timeout: Duration::from_secs(10),
            redelivery_backoff: BackoffPolicy {
                base: Duration::from_millis(500),
                cap: Duration::from_secs(30),
                max_attempts: 5,
            },
        }
    }
}

impl ConsumerConfig {
    /// Default profile bound to the given queue.
    #[must_use]
    pub fn for_queue(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            ..Self::default()
        }
    }
}

/// Per-network broadcast configuration.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Confirmations required before a send counts as `Confirmed`
    /// (network-specific: 1 for a fast testnet, more elsewhere).
    pub confirmation_threshold: u64,
    /// Interval between confirmation-status polls.
    pub poll_interval: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            confirmation_threshold: 1,
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Broadcast-coordinator configuration.
#[derive(Debug, Clone, Default)]
pub struct BroadcastConfig {
    /// Per-network settings, keyed by network id.
    pub networks: HashMap<String, NetworkConfig>,
}

impl BroadcastConfig {
    /// Settings for a network, falling back to the default profile.
    #[must_use]
    pub fn network(&self, id: &str) -> NetworkConfig {
        self.networks.get(id).cloned().unwrap_or_default()
    }
}

/// Saga-orchestrator configuration.
#[derive(Debug, Clone)]
pub struct SagaConfig {
    /// Step budget applied when a step defines no explicit timeout.
    pub default_step_timeout: Duration,
    /// Overall forward-path budget per instance; `None` means unbounded.
    /// Exceeding it skips the remaining steps and starts compensation.
    pub saga_deadline: Option<Duration>,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            default_step_timeout: Duration::from_secs(30),
            saga_deadline: None,
        }
    }
}
