//! # Signed Tokens
//!
//! Compact signed token over canonical payload bytes:
//!
//! ```text
//! base64url(header) . base64url(digest) . base64url(signature)
//! ```
//!
//! The header carries `{alg, kid, ts, hash, typ}`; the digest is SHA-256
//! over the canonical bytes; the signature covers
//! `base64url(header) || "." || base64url(digest)`.
//!
//! Signing is scheme-agnostic behind [`SignatureScheme`]. The default
//! scheme is Ed25519 (deterministic nonces, no RNG at signing time); a
//! post-quantum scheme plugs in behind the same trait and only the `alg`
//! header value changes.

use crate::errors::CryptoError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shared_types::EnvelopeSignature;
use std::sync::Arc;
use zeroize::Zeroize;

/// Algorithm identifier for the default scheme.
pub const ALG_ED25519: &str = "Ed25519";

/// Hash algorithm identifier used for payload digests.
pub const HASH_SHA256: &str = "SHA-256";

/// Token type marker carried in the header.
pub const TOKEN_TYPE: &str = "EVT";

/// Signed-token header.
///
/// Field order is part of the wire format: the signing input serializes
/// this struct with serde_json, which emits fields in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHeader {
    /// Signature algorithm identifier.
    pub alg: String,
    /// Signing key id.
    pub kid: String,
    /// Signing timestamp.
    pub ts: DateTime<Utc>,
    /// Payload hash algorithm.
    pub hash: String,
    /// Token type marker.
    pub typ: String,
}

/// A complete signed token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedToken {
    /// Token header.
    pub header: TokenHeader,
    /// SHA-256 digest of the canonical payload bytes.
    pub digest: [u8; 32],
    /// Signature over the header/digest signing input.
    pub signature: Vec<u8>,
}

impl SignedToken {
    /// Compact three-part encoding.
    pub fn compact(&self) -> Result<String, CryptoError> {
        let header = header_b64(&self.header)?;
        let digest = URL_SAFE_NO_PAD.encode(self.digest);
        let sig = URL_SAFE_NO_PAD.encode(&self.signature);
        Ok(format!("{header}.{digest}.{sig}"))
    }

    /// Convert into the envelope-attached signature block.
    #[must_use]
    pub fn into_envelope_signature(self) -> EnvelopeSignature {
        EnvelopeSignature {
            algorithm: self.header.alg,
            key_id: self.header.kid,
            timestamp_utc: self.header.ts,
            hash_algorithm: self.header.hash,
            signature: self.signature,
        }
    }
}

/// Digest the canonical payload bytes.
#[must_use]
pub fn payload_digest(canonical: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(canonical);
    let result = hasher.finalize();
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&result);
    digest
}

fn header_b64(header: &TokenHeader) -> Result<String, CryptoError> {
    let json = serde_json::to_vec(header)
        .map_err(|e| CryptoError::HeaderEncoding(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// The exact bytes a signature covers for the given header and payload.
pub fn signing_input(header: &TokenHeader, canonical: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let header = header_b64(header)?;
    let digest = URL_SAFE_NO_PAD.encode(payload_digest(canonical));
    Ok(format!("{header}.{digest}").into_bytes())
}

/// Rebuild the signing input from an envelope signature block. The verifier
/// uses this to check the signature without access to the original token.
pub fn signing_input_for(
    signature: &EnvelopeSignature,
    canonical: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let header = TokenHeader {
        alg: signature.algorithm.clone(),
        kid: signature.key_id.clone(),
        ts: signature.timestamp_utc,
        hash: signature.hash_algorithm.clone(),
        typ: TOKEN_TYPE.to_string(),
    };
    signing_input(&header, canonical)
}

/// A signature scheme the mesh can sign envelopes with.
pub trait SignatureScheme: Send + Sync {
    /// Stable algorithm identifier placed in the token header.
    fn algorithm(&self) -> &'static str;

    /// Sign a message.
    fn sign(&self, message: &[u8]) -> Vec<u8>;

    /// Public key material for distribution.
    fn public_key(&self) -> Vec<u8>;
}

/// Verify a signature for the named algorithm against raw key material.
pub fn verify_signature(
    algorithm: &str,
    public_key: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<(), CryptoError> {
    match algorithm {
        ALG_ED25519 => {
            let key_bytes: [u8; 32] = public_key
                .try_into()
                .map_err(|_| CryptoError::InvalidPublicKey)?;
            let verifying_key =
                VerifyingKey::from_bytes(&key_bytes).map_err(|_| CryptoError::InvalidPublicKey)?;
            let sig_bytes: [u8; 64] = signature
                .try_into()
                .map_err(|_| CryptoError::InvalidSignatureBytes)?;
            let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);
            verifying_key
                .verify(message, &sig)
                .map_err(|_| CryptoError::InvalidSignatureBytes)
        }
        other => Err(CryptoError::UnsupportedAlgorithm(other.to_string())),
    }
}

/// Ed25519 implementation of [`SignatureScheme`].
pub struct Ed25519Scheme {
    signing_key: SigningKey,
}

impl Ed25519Scheme {
    /// Generate a random keypair.
    #[must_use]
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut rand::thread_rng());
        Self { signing_key }
    }

    /// Create from a secret seed (32 bytes).
    #[must_use]
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }
}

impl SignatureScheme for Ed25519Scheme {
    fn algorithm(&self) -> &'static str {
        ALG_ED25519
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }

    fn public_key(&self) -> Vec<u8> {
        self.signing_key.verifying_key().to_bytes().to_vec()
    }
}

impl Drop for Ed25519Scheme {
    fn drop(&mut self) {
        // Zeroize secret key material
        let mut bytes = self.signing_key.to_bytes();
        bytes.zeroize();
    }
}

/// Signs canonical payload bytes into envelope signature blocks.
pub struct EnvelopeSigner {
    scheme: Arc<dyn SignatureScheme>,
    key_id: String,
}

impl EnvelopeSigner {
    /// Create a signer for the given scheme and published key id.
    #[must_use]
    pub fn new(scheme: Arc<dyn SignatureScheme>, key_id: impl Into<String>) -> Self {
        Self {
            scheme,
            key_id: key_id.into(),
        }
    }

    /// Key id this signer stamps into headers.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Public key material for publication to the distribution endpoint.
    #[must_use]
    pub fn public_key(&self) -> Vec<u8> {
        self.scheme.public_key()
    }

    /// Algorithm identifier of the underlying scheme.
    #[must_use]
    pub fn algorithm(&self) -> &'static str {
        self.scheme.algorithm()
    }

    /// Sign canonical payload bytes into a token.
    pub fn sign(&self, canonical: &[u8]) -> Result<SignedToken, CryptoError> {
        let header = TokenHeader {
            alg: self.scheme.algorithm().to_string(),
            kid: self.key_id.clone(),
            ts: Utc::now(),
            hash: HASH_SHA256.to_string(),
            typ: TOKEN_TYPE.to_string(),
        };
        let input = signing_input(&header, canonical)?;
        let signature = self.scheme.sign(&input);
        Ok(SignedToken {
            header,
            digest: payload_digest(canonical),
            signature,
        })
    }

    /// Sign canonical payload bytes directly into an envelope signature block.
    pub fn envelope_signature(&self, canonical: &[u8]) -> Result<EnvelopeSignature, CryptoError> {
        Ok(self.sign(canonical)?.into_envelope_signature())
    }
}
