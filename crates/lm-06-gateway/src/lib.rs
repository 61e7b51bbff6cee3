//! # Operator Gateway Subsystem (lm-06)
//!
//! Read-only HTTP surface over the mesh's internal state:
//!
//! | Route | Serves |
//! |-------|--------|
//! | `GET /health` | Liveness probe |
//! | `GET /keys` | Published verification keys (the key-distribution endpoint) |
//! | `GET /events/:correlation_id` | Journal entries for one business flow |
//! | `GET /resources/:service/:entity/:id/events` | Journal entries for one entity |
//! | `GET /sagas/:saga_id` | Current state of one saga instance |
//! | `GET /queues/:queue/dead-letters` | A queue's dead letters |
//!
//! Everything here is a *view*; no route mutates mesh state. Writes travel
//! exclusively as signed envelopes through the bus.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod router;

// Re-export main types
pub use router::{build_router, ApiError, AppState};
