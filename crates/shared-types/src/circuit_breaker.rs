//! # Circuit Breaker
//!
//! Per-dependency three-state breaker used wherever the mesh calls an
//! external or flaky dependency (a settlement network, the ledger service).
//!
//! State machine:
//!
//! ```text
//! CLOSED --(failures in window >= threshold)--> OPEN
//! OPEN   --(cooldown elapsed)----------------> HALF-OPEN
//! HALF-OPEN --(probe successes)--------------> CLOSED
//! HALF-OPEN --(probe failure)----------------> OPEN
//! ```
//!
//! Thresholds are per-dependency configuration, never hardcoded.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation: calls pass through, failures counted.
    Closed,
    /// Failing fast: calls rejected without touching the dependency.
    Open,
    /// Probing: a limited number of calls allowed through.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Per-dependency breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failures within `failure_window` that trip the breaker.
    pub failure_threshold: u32,
    /// Rolling window over which failures are counted.
    pub failure_window: Duration,
    /// How long the breaker stays open before probing.
    pub cooldown: Duration,
    /// Probe calls that must succeed in half-open before closing.
    pub probe_count: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window: Duration::from_secs(60),
            cooldown: Duration::from_secs(30),
            probe_count: 3,
        }
    }
}

struct BreakerInner {
    state: CircuitState,
    /// Failure instants within the rolling window (Closed state only).
    failures: VecDeque<Instant>,
    /// Probes in flight plus successes so far (HalfOpen state only).
    probes_inflight: u32,
    probe_successes: u32,
    opened_at: Option<Instant>,
}

/// Three-state circuit breaker guarding one dependency.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a breaker for the named dependency.
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failures: VecDeque::new(),
                probes_inflight: 0,
                probe_successes: 0,
                opened_at: None,
            }),
        }
    }

    /// Dependency name this breaker guards.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a call should be attempted right now.
    ///
    /// In half-open state at most `probe_count` calls are let through at a
    /// time; callers that receive `true` must report the outcome via
    /// [`record_success`](Self::record_success) or
    /// [`record_failure`](Self::record_failure).
    pub fn should_allow(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.config.cooldown {
                    info!(dependency = %self.name, "Circuit breaker transitioning to half-open");
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_successes = 0;
                    inner.probes_inflight = 1;
                    true
                } else {
                    debug!(
                        dependency = %self.name,
                        remaining_ms = (self.config.cooldown - elapsed).as_millis() as u64,
                        "Circuit breaker open, rejecting call"
                    );
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.probes_inflight < self.config.probe_count {
                    inner.probes_inflight += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Report a successful call.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failures.clear();
            }
            CircuitState::HalfOpen => {
                inner.probes_inflight = inner.probes_inflight.saturating_sub(1);
                inner.probe_successes += 1;
                if inner.probe_successes >= self.config.probe_count {
                    info!(dependency = %self.name, "Circuit breaker closing after successful probes");
                    inner.state = CircuitState::Closed;
                    inner.failures.clear();
                    inner.opened_at = None;
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Report a failed call.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                let now = Instant::now();
                inner.failures.push_back(now);
                while let Some(front) = inner.failures.front() {
                    if now.duration_since(*front) > self.config.failure_window {
                        inner.failures.pop_front();
                    } else {
                        break;
                    }
                }
                if inner.failures.len() as u32 >= self.config.failure_threshold {
                    warn!(
                        dependency = %self.name,
                        failures = inner.failures.len(),
                        cooldown_secs = self.config.cooldown.as_secs(),
                        "Circuit breaker opening"
                    );
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(now);
                    inner.failures.clear();
                }
            }
            CircuitState::HalfOpen => {
                warn!(dependency = %self.name, "Circuit breaker reopening after probe failure");
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.probes_inflight = 0;
                inner.probe_successes = 0;
            }
            CircuitState::Open => {
                inner.opened_at = Some(Instant::now());
            }
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }
}

/// Registry handing out one breaker per dependency name.
///
/// Per-dependency configs may be registered up front; unknown names fall
/// back to the default config.
pub struct BreakerRegistry {
    default_config: CircuitBreakerConfig,
    configs: Mutex<HashMap<String, CircuitBreakerConfig>>,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    /// Create a registry with the given fallback config.
    #[must_use]
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            default_config,
            configs: Mutex::new(HashMap::new()),
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Register a dedicated config for one dependency. Must run before the
    /// first `breaker_for` call for that name to take effect.
    pub fn configure(&self, name: impl Into<String>, config: CircuitBreakerConfig) {
        self.configs.lock().insert(name.into(), config);
    }

    /// Get (or lazily create) the breaker for a dependency.
    pub fn breaker_for(&self, name: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock();
        if let Some(b) = breakers.get(name) {
            return Arc::clone(b);
        }
        let config = self
            .configs
            .lock()
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.default_config.clone());
        let breaker = Arc::new(CircuitBreaker::new(name, config));
        breakers.insert(name.to_string(), Arc::clone(&breaker));
        breaker
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
