//! # Journal Entries
//!
//! One entry per event hop. Entries carry a summary of the envelope rather
//! than the full payload; the payload is already durable on the bus and in
//! the owning service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared_types::{DetailType, EventEnvelope, ResourceUrn};
use uuid::Uuid;

/// What happened to the event at this hop. This vocabulary is fixed: any
/// richer label (handler name, dead-letter reason) goes in the entry's
/// `note`, so journal consumers never see a status they do not know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingStatus {
    /// A consumer pulled the envelope off its queue.
    Received,
    /// Signature verification passed.
    Verified,
    /// The envelope never reached a successful handler: verification
    /// failed, no handler was registered, or retries ran out. It went to
    /// the dead letter queue; the `note` carries the reason.
    Rejected,
    /// A publisher deposited the envelope onto the bus, or a consumer's
    /// handler finished it successfully. The `service` field tells the
    /// two hops apart.
    Dispatched,
}

/// One immutable journal record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Unique id of this entry.
    pub entry_id: Uuid,
    /// When the entry was recorded.
    pub recorded_at: DateTime<Utc>,
    /// Service that recorded the entry (not necessarily the event source).
    pub service: String,
    /// What happened at this hop.
    pub status: ProcessingStatus,
    /// Correlation id of the business flow.
    pub correlation_id: Uuid,
    /// Emitting service of the journaled envelope.
    pub source: String,
    /// Payload shape of the journaled envelope.
    pub detail_type: DetailType,
    /// Business entity the envelope affects.
    pub resource: ResourceUrn,
    /// Free-form operator note (failure reason, handler name).
    pub note: Option<String>,
}

impl JournalEntry {
    /// Record a hop for the given envelope.
    #[must_use]
    pub fn record(
        service: impl Into<String>,
        envelope: &EventEnvelope,
        status: ProcessingStatus,
    ) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            recorded_at: Utc::now(),
            service: service.into(),
            status,
            correlation_id: envelope.correlation_id(),
            source: envelope.source().to_string(),
            detail_type: envelope.detail_type().clone(),
            resource: envelope.resource().clone(),
            note: None,
        }
    }

    /// Attach an operator note.
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}
