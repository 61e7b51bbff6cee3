//! # Transport Contract
//!
//! The only interface the rest of the workspace has to the physical
//! queue/topic layer. Implementations must provide durable, at-least-once
//! delivery with per-message visibility leases and per-queue dead-letter
//! capability.

use crate::message::{DeadLetter, LeasedMessage, Receipt};
use async_trait::async_trait;
use shared_types::EventEnvelope;
use std::time::Duration;
use thiserror::Error;

/// Errors from transport operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Queue name is not declared on this bus.
    #[error("Unknown queue: {0}")]
    UnknownQueue(String),

    /// Receipt does not belong to a live lease (already settled or expired).
    #[error("Unknown or expired receipt")]
    UnknownReceipt,

    /// Transient transport outage; the caller may retry with backoff.
    #[error("Transport unavailable: {0}")]
    Unavailable(String),
}

impl TransportError {
    /// Whether a retry with backoff is worthwhile.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Durable at-least-once queue/topic transport.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Deposit an envelope onto a topic. Returns how many queues the
    /// routing rules fanned it out to (zero means it was dropped).
    async fn send(&self, topic: &str, envelope: EventEnvelope) -> Result<usize, TransportError>;

    /// Long-poll a queue for up to `max` messages, waiting at most `wait`.
    /// Delivered messages are leased for `visibility`; a lease that is not
    /// settled in time redelivers the message.
    async fn receive(
        &self,
        queue: &str,
        max: usize,
        wait: Duration,
        visibility: Duration,
    ) -> Result<Vec<LeasedMessage>, TransportError>;

    /// Settle a lease by deleting the message (successful processing).
    async fn delete(&self, queue: &str, receipt: Receipt) -> Result<(), TransportError>;

    /// Settle a lease by scheduling redelivery after a delay (retry).
    async fn redeliver(
        &self,
        queue: &str,
        receipt: Receipt,
        after: Duration,
    ) -> Result<(), TransportError>;

    /// Settle a lease by moving the message to the queue's DLQ with the
    /// accumulated failure reason chain.
    async fn dead_letter(
        &self,
        queue: &str,
        receipt: Receipt,
        reasons: Vec<String>,
    ) -> Result<(), TransportError>;

    /// Inspect a queue's dead letters (operator surface).
    async fn dead_letters(&self, queue: &str) -> Result<Vec<DeadLetter>, TransportError>;
}
