//! # Consumer Host Subsystem (lm-02)
//!
//! Drains one queue and walks every delivery through a fixed state machine
//! before any business code runs:
//!
//! ```text
//! receive ──► verify signature ──► resolve handler ──► handle
//!                │ fail                │ none              │
//!                ▼                     ▼                   ├─ Ok ──► delete
//!          DLQ: SignatureInvalid  DLQ: NoHandler           ├─ Permanent ──► DLQ
//!          (never retried)                                 └─ Transient ──► redeliver
//!                                                             (max retries ──► DLQ)
//! ```
//!
//! ## Delivery Rules
//!
//! - A message is deleted **only after** its handler returns success.
//!   Crash at any earlier point means redelivery, so handlers must be
//!   idempotent.
//! - Signature failures are fatal: the envelope is dead-lettered with
//!   reason `SignatureInvalid` and never retried.
//! - Transient handler failures redeliver with exponential backoff until
//!   the retry budget is spent, then dead-letter with the accumulated
//!   reason chain.
//! - At most `max_in_flight` handlers run concurrently per host.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod handler;
pub mod host;

// Re-export main types
pub use handler::{EventHandler, HandlerRegistry};
pub use host::{ConsumerHost, HostError};
