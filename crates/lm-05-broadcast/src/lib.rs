//! # Multi-Network Broadcast Subsystem (lm-05)
//!
//! Submits one signed envelope to N settlement networks in parallel and
//! decides the overall outcome against a `required_successes` threshold:
//!
//! ```text
//!                 ┌──► network A ──confirmed──┐
//! envelope ──────►├──► network B ──failed─────┤──► successes ≥ required? ──► Succeeded
//!                 └──► network C ──pending────┘    failures make required
//!                                                  unreachable? ──► Failed (early)
//! ```
//!
//! ## Decision Rules
//!
//! - The decision resolves **early**: as soon as the threshold is met, or
//!   as soon as enough networks have failed that it can no longer be met.
//! - Networks still in flight after the decision keep running in the
//!   background and keep updating the shared status map; nothing is
//!   cancelled. A late confirmation is recorded but cannot change the
//!   decision.
//! - Every network sits behind its own circuit breaker. An open breaker
//!   counts as an immediate failure for that network without touching it.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod coordinator;
pub mod network;

// Re-export main types
pub use coordinator::{
    BroadcastCoordinator, BroadcastError, BroadcastHandle, BroadcastOutcome, NetworkStatus,
};
pub use network::{MockNetworkClient, NetworkClient, NetworkError};
