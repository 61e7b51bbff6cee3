//! # Transport Messages
//!
//! Lease handles and dead letters as seen by consumers.

use chrono::{DateTime, Utc};
use shared_types::EventEnvelope;
use uuid::Uuid;

/// Opaque handle identifying one delivery of one message.
///
/// A receipt is only valid while the lease it belongs to is alive; delete,
/// redeliver, and dead-letter all consume it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Receipt(pub Uuid);

impl Receipt {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// One leased delivery of an envelope.
#[derive(Debug, Clone)]
pub struct LeasedMessage {
    /// The delivered envelope.
    pub envelope: EventEnvelope,
    /// Handle for delete/redeliver/dead-letter.
    pub receipt: Receipt,
    /// How many times this message has been delivered, this one included.
    pub receive_count: u32,
}

/// A message retired to the dead letter queue.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    /// The envelope that could not be processed.
    pub envelope: EventEnvelope,
    /// Accumulated failure reason chain, oldest first.
    pub reasons: Vec<String>,
    /// When the message was dead-lettered.
    pub dead_lettered_at: DateTime<Utc>,
}
