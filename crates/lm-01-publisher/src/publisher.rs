//! # Sealing Pipeline
//!
//! Canonicalize, sign, seal, send. The envelope returned to the caller is
//! the exact envelope on the wire; callers hold it for correlation but can
//! never mutate it.

use lm_03_journal::{spawn_append, Journal, JournalEntry, ProcessingStatus};
use shared_bus::{QueueTransport, TransportError};
use shared_crypto::{CanonicalError, CanonicalPayload, CryptoError, EnvelopeSigner};
use shared_types::{
    DetailType, EnvelopeError, EventEnvelope, PublisherConfig, ResourceUrn, RetryError,
    TraceContext,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Errors from the publish pipeline.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The payload could not be canonicalized (e.g. it contains a float).
    #[error("Payload rejected: {0}")]
    Canonical(#[from] CanonicalError),

    /// Signing failed.
    #[error("Signing failed: {0}")]
    Crypto(#[from] CryptoError),

    /// The sealed envelope was structurally invalid.
    #[error("Envelope rejected: {0}")]
    Envelope(#[from] EnvelopeError),

    /// The transport rejected the send with a non-transient error.
    #[error("Transport rejected send: {0}")]
    Transport(TransportError),

    /// Every retry attempt failed with a transient transport error.
    #[error("Transport exhausted after {attempts} attempts: {last}")]
    TransportExhausted {
        /// Attempts made, including the first.
        attempts: u32,
        /// The final transient error.
        last: TransportError,
    },
}

/// Publishes signed envelopes onto the mesh.
pub struct EventPublisher {
    config: PublisherConfig,
    signer: EnvelopeSigner,
    transport: Arc<dyn QueueTransport>,
    journal: Arc<dyn Journal>,
}

impl EventPublisher {
    /// Wire up a publisher for one emitting service.
    #[must_use]
    pub fn new(
        config: PublisherConfig,
        signer: EnvelopeSigner,
        transport: Arc<dyn QueueTransport>,
        journal: Arc<dyn Journal>,
    ) -> Self {
        Self {
            config,
            signer,
            transport,
            journal,
        }
    }

    /// Emitting service name stamped into every envelope.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.config.source
    }

    /// Seal and send one event. Returns the envelope exactly as it went
    /// onto the wire.
    pub async fn publish(
        &self,
        detail_type: DetailType,
        resource: ResourceUrn,
        trace: TraceContext,
        payload: serde_json::Value,
    ) -> Result<EventEnvelope, PublishError> {
        let canonical = CanonicalPayload::new(payload)?;
        let signature = self.signer.envelope_signature(canonical.bytes())?;
        let envelope = EventEnvelope::sealed(
            self.config.source.clone(),
            detail_type,
            resource,
            trace,
            canonical.into_bytes(),
            signature,
        )?;

        let fanout = self
            .config
            .retry
            .retry(TransportError::is_transient, || {
                self.transport.send(&self.config.topic, envelope.clone())
            })
            .await
            .map_err(|e| match e {
                RetryError::Permanent(e) => PublishError::Transport(e),
                RetryError::Exhausted { attempts, last } => {
                    PublishError::TransportExhausted { attempts, last }
                }
            })?;

        if fanout == 0 {
            warn!(
                topic = %self.config.topic,
                detail_type = %envelope.detail_type(),
                "Published event matched no queue binding"
            );
        }

        spawn_append(
            self.journal.clone(),
            JournalEntry::record(&self.config.source, &envelope, ProcessingStatus::Dispatched),
        );

        info!(
            source = %self.config.source,
            detail_type = %envelope.detail_type(),
            correlation_id = %envelope.correlation_id(),
            key_id = %envelope.signature().key_id,
            fanout,
            "Event published"
        );
        Ok(envelope)
    }
}
