//! # Shared Types - Core Types for the Coordination Mesh
//!
//! The vocabulary every subsystem speaks:
//!
//! - **Envelope**: the signed, immutable unit of event transport
//! - **Naming**: versioned detail types and resource URNs
//! - **Trace**: correlation context threaded through every hop
//! - **Config**: explicit per-component configuration (no ambient state)
//! - **Retry**: pure backoff policy plus a generic retry wrapper
//! - **Circuit Breaker**: per-dependency three-state breaker
//!
//! ## Architecture Rules
//!
//! - All cross-service communication travels as a signed [`EventEnvelope`]
//! - An envelope is **immutable once signed**; any payload change means a
//!   new envelope with a new logical version
//! - Components receive their configuration through constructors; there is
//!   no global mutable state in this workspace

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod circuit_breaker;
pub mod config;
pub mod envelope;
pub mod errors;
pub mod naming;
pub mod retry;
pub mod trace;

// Re-export main types
pub use circuit_breaker::{BreakerRegistry, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use config::{BroadcastConfig, ConsumerConfig, NetworkConfig, PublisherConfig, SagaConfig};
pub use envelope::{EnvelopeError, EnvelopeSignature, EventEnvelope};
pub use errors::HandlerError;
pub use naming::{DetailType, NamingError, ResourceUrn};
pub use retry::{BackoffPolicy, RetryError};
pub use trace::TraceContext;

/// Current protocol version for mesh envelopes.
pub const PROTOCOL_VERSION: u16 = 1;
