//! # Event Journal Subsystem (lm-03)
//!
//! Append-only record of every hop an event takes through the mesh. Each
//! service writes an entry when it dispatches, receives, verifies, rejects,
//! or finishes processing an envelope, so an operator can reconstruct the
//! full path of a business flow from one correlation id.
//!
//! ## Query Axes
//!
//! - **Correlation id**: every entry for one business flow, in order
//! - **Resource URN**: every entry touching one business entity
//!
//! ## Operational Rules
//!
//! - The journal is **advisory**: a journal write failure is retried once
//!   off the hot path, then logged and dropped. It never blocks or fails
//!   event dispatch. Use [`spawn_append`] from hot paths.
//! - Entries are immutable once appended. There is no update or delete
//!   surface at all.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod entry;
pub mod memory;
pub mod store;

// Re-export main types
pub use entry::{JournalEntry, ProcessingStatus};
pub use memory::InMemoryJournal;
pub use store::{spawn_append, Journal, JournalError, TimeRange};
