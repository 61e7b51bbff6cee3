//! # Shared Crypto - Envelope Signing Primitives
//!
//! ## Components
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | `canonical` | Deterministic payload serialization prior to signing |
//! | `token` | Compact signed token over canonical bytes |
//! | `keyring` | Verification-side key cache with rotation overlap |
//!
//! ## Security Properties
//!
//! - **Canonicalization**: byte-identical output for semantically identical
//!   payloads regardless of key insertion order
//! - **Scheme-agnostic signing**: the token header names the algorithm; the
//!   default scheme is Ed25519 and a post-quantum scheme slots in behind the
//!   same [`SignatureScheme`] trait without changing any wire format
//! - **Fail closed**: unknown key ids, stale timestamps, and algorithm
//!   mismatches all reject the envelope; rejection is never retried

#![warn(missing_docs)]
#![warn(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod canonical;
pub mod errors;
pub mod keyring;
pub mod token;

// Re-exports
pub use canonical::CanonicalPayload;
pub use errors::{CanonicalError, CryptoError, VerifyError};
pub use keyring::{KeyDistribution, KeyRing, KeyRingConfig, PublishedKey, StaticKeyServer};
pub use token::{Ed25519Scheme, EnvelopeSigner, SignatureScheme, SignedToken, TokenHeader};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
