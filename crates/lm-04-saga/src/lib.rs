//! # Saga Orchestrator Subsystem (lm-04)
//!
//! Coordinates multi-service business flows that cannot share a database
//! transaction. A saga is an ordered list of steps; each step carries a
//! forward action and a compensating action. When a step fails, every
//! previously completed step is compensated in reverse order.
//!
//! ```text
//! Running ──all steps ok──► Completed
//!    │
//!    └─step fails──► Compensating ──all undone──► Compensated
//!                         │
//!                         └─compensation fails──► Failed  (operator case)
//! ```
//!
//! ## Durability Rules
//!
//! - State is persisted **before** each step executes and after every
//!   transition, so a crashed orchestrator resumes exactly where it
//!   stopped. Steps and compensations must be idempotent: resume may
//!   re-run the step that was in flight at the crash.
//! - Saves are guarded by an optimistic version check; two orchestrators
//!   driving the same saga cannot silently interleave.
//! - `Failed` is terminal and demands operator attention: the flow is in
//!   a partially compensated state that the system could not undo.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod definition;
pub mod instance;
pub mod orchestrator;
pub mod store;

// Re-export main types
pub use definition::{SagaContext, SagaDefinition, StepAction, StepDefinition};
pub use instance::{SagaInstance, SagaState, StepRecord};
pub use orchestrator::{SagaError, SagaOrchestrator};
pub use store::{InMemorySagaStore, SagaStore, SagaStoreError};
