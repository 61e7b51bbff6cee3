//! # Crypto Error Types

use thiserror::Error;

/// Errors from payload canonicalization.
///
/// Unsupported shapes are rejected at construction time; canonicalization
/// itself cannot fail afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CanonicalError {
    /// Floating-point numbers are not canonical; amounts travel as integer
    /// minor units.
    #[error("Unsupported number in payload: {0} (floats are rejected; use integer minor units)")]
    UnsupportedNumber(String),

    /// JSON string escaping failed (should not happen for valid UTF-8).
    #[error("Canonical serialization failed: {0}")]
    Serialization(String),
}

/// Errors from signing-side operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Key material did not parse as a valid public key.
    #[error("Invalid public key")]
    InvalidPublicKey,

    /// Signature bytes have the wrong shape for the algorithm.
    #[error("Invalid signature bytes")]
    InvalidSignatureBytes,

    /// No scheme registered for this algorithm identifier.
    #[error("Unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Header serialization failed while building the signing input.
    #[error("Failed to encode token header: {0}")]
    HeaderEncoding(String),
}

/// Errors from envelope verification.
///
/// Every variant is fatal for the envelope: the consumer host routes it to
/// the dead-letter path with reason `SignatureInvalid` and never retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// Key id not present in the cache, even after a refresh.
    #[error("Unknown key id: {kid}")]
    UnknownKey {
        /// The key id the envelope named.
        kid: String,
    },

    /// Envelope algorithm does not match the published key's algorithm.
    #[error("Algorithm mismatch: envelope says {envelope}, key {kid} is {key}")]
    AlgorithmMismatch {
        /// Algorithm claimed by the envelope.
        envelope: String,
        /// Algorithm of the published key.
        key: String,
        /// The key id involved.
        kid: String,
    },

    /// Signing timestamp outside the allowed clock-skew window.
    #[error("Signature timestamp outside clock-skew window: skew {skew_secs}s > {max_secs}s")]
    StaleTimestamp {
        /// Observed skew in seconds.
        skew_secs: i64,
        /// Configured maximum skew in seconds.
        max_secs: i64,
    },

    /// Hash algorithm named by the envelope is not supported.
    #[error("Unsupported hash algorithm: {0}")]
    UnsupportedHash(String),

    /// The signature did not verify over the canonical bytes.
    #[error("Signature verification failed")]
    BadSignature,

    /// The key distribution endpoint could not be reached.
    #[error("Key distribution fetch failed: {0}")]
    KeyFetch(String),
}
