//! # Shared Bus - Queue/Topic Transport for the Coordination Mesh
//!
//! Transport-agnostic bus contract plus the in-memory reference
//! implementation. Any durable, at-least-once, per-consumer-group queue can
//! fill this role; the rest of the workspace only sees [`QueueTransport`].
//!
//! ## Delivery Model
//!
//! ```text
//! Publisher ──► Topic ──(routing rules)──► Queue A ──► Consumer Host A
//!                   │                          │
//!                   └──────────────────────► Queue B   (fan-out)
//!                                              │
//!                                        visibility lease
//!                                              │
//!                               delete | redeliver | dead-letter
//! ```
//!
//! - **At-least-once**: a leased message that is neither deleted nor
//!   dead-lettered before its lease expires is redelivered with an
//!   incremented receive count.
//! - **Ordered lanes**: a FIFO queue keys messages by the resource id;
//!   while one message of a lane is in flight no other message of that
//!   lane is released. Ledger-affecting event types route here.
//! - **Dead letter queue**: every queue carries its own DLQ holding the
//!   envelope plus the accumulated failure reason chain.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod memory;
pub mod message;
pub mod routing;
pub mod transport;

// Re-export main types
pub use memory::InMemoryBus;
pub use message::{DeadLetter, LeasedMessage, Receipt};
pub use routing::{QueueBinding, RoutingRule};
pub use transport::{QueueTransport, TransportError};

/// Default cap on messages returned by one receive call.
pub const DEFAULT_RECEIVE_BATCH: usize = 10;
