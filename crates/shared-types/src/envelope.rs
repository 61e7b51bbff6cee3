//! # Event Envelope
//!
//! The universal wire-level unit for all cross-service events.
//!
//! ## Security Properties
//!
//! - **Immutability**: an envelope is sealed at signing time. Fields are
//!   private and exposed read-only; any payload change invalidates the
//!   signature and must produce a new envelope with a new logical version.
//! - **Correlation**: every envelope carries a [`TraceContext`] whose
//!   correlation id is the journal's primary lookup key.
//! - **Signature coverage**: the signature covers the canonical payload
//!   bytes plus the signing header (algorithm, key id, timestamp, hash).

use crate::naming::{DetailType, ResourceUrn};
use crate::trace::TraceContext;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from envelope construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// The emitting service name was empty.
    #[error("Envelope source must be non-empty")]
    EmptySource,

    /// The canonical payload was empty.
    #[error("Envelope detail core must be non-empty")]
    EmptyDetailCore,
}

/// Signature block attached to every envelope.
///
/// Mirrors the compact signed-token header so a verifier can rebuild the
/// exact signed message from the envelope alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeSignature {
    /// Signature algorithm identifier (e.g. `"Ed25519"`).
    pub algorithm: String,

    /// Identifier of the signing key, resolved against the key
    /// distribution endpoint at verification time.
    pub key_id: String,

    /// Signing time. Verifiers reject envelopes outside the clock-skew
    /// window around this timestamp.
    pub timestamp_utc: DateTime<Utc>,

    /// Hash algorithm used to digest the canonical payload (e.g. `"SHA-256"`).
    pub hash_algorithm: String,

    /// Raw signature bytes.
    pub signature: Vec<u8>,
}

/// The signed, routable unit of event transport.
///
/// Construct via [`EventEnvelope::sealed`] only; there are no mutators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Logical domain/service that emitted the event.
    source: String,

    /// Versioned, stable identifier for the payload shape.
    detail_type: DetailType,

    /// Business entity affected by this event.
    resource: ResourceUrn,

    /// Correlation context for this hop.
    trace: TraceContext,

    /// Canonicalized business payload. Opaque bytes once signed.
    detail_core: Vec<u8>,

    /// Signature over the canonical payload plus signing header.
    signature: EnvelopeSignature,
}

impl EventEnvelope {
    /// Seal an envelope. This is the only constructor; the result is
    /// immutable for its lifetime.
    pub fn sealed(
        source: impl Into<String>,
        detail_type: DetailType,
        resource: ResourceUrn,
        trace: TraceContext,
        detail_core: Vec<u8>,
        signature: EnvelopeSignature,
    ) -> Result<Self, EnvelopeError> {
        let source = source.into();
        if source.is_empty() {
            return Err(EnvelopeError::EmptySource);
        }
        if detail_core.is_empty() {
            return Err(EnvelopeError::EmptyDetailCore);
        }

        Ok(Self {
            source,
            detail_type,
            resource,
            trace,
            detail_core,
            signature,
        })
    }

    /// Emitting service.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Payload shape identifier.
    #[must_use]
    pub fn detail_type(&self) -> &DetailType {
        &self.detail_type
    }

    /// Affected business entity.
    #[must_use]
    pub fn resource(&self) -> &ResourceUrn {
        &self.resource
    }

    /// Correlation context.
    #[must_use]
    pub fn trace(&self) -> &TraceContext {
        &self.trace
    }

    /// Canonical payload bytes.
    #[must_use]
    pub fn detail_core(&self) -> &[u8] {
        &self.detail_core
    }

    /// Signature block.
    #[must_use]
    pub fn signature(&self) -> &EnvelopeSignature {
        &self.signature
    }

    /// Correlation id shorthand (journal primary key).
    #[must_use]
    pub fn correlation_id(&self) -> uuid::Uuid {
        self.trace.correlation_id
    }
}
