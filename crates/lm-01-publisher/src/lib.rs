//! # Event Publisher Subsystem (lm-01)
//!
//! The only way an event legitimately enters the mesh. The publisher takes
//! a business payload and walks it through the sealing pipeline:
//!
//! ```text
//! payload (JSON) ──► canonicalize ──► sign ──► seal envelope ──► send
//!                                                    │
//!                                            journal: Dispatched
//! ```
//!
//! ## Guarantees
//!
//! - **Determinism**: semantically identical payloads produce byte-identical
//!   canonical bytes, so re-publishing the same payload signs the same digest.
//! - **Bounded retry**: transient transport failures are retried with
//!   exponential backoff (base 100ms, cap 5s, 5 attempts); exhaustion
//!   surfaces as [`PublishError::TransportExhausted`] for the caller.
//! - **Journal mirror**: every successful send appends a `Dispatched` entry.
//!   The append is fire-and-forget; the journal never blocks publishing.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod publisher;

// Re-export main types
pub use publisher::{EventPublisher, PublishError};
