//! # Key Ring
//!
//! Verification-side cache over the key-distribution endpoint.
//!
//! ## Rotation Semantics
//!
//! - A new key id is accepted the moment the cache sees it (the cache
//!   refreshes on any key-id miss).
//! - A key id that disappears from the distribution set stays valid for the
//!   configured overlap window, then is purged; verifications with a purged
//!   id fail closed.
//! - Every verification failure is fatal for that envelope: the consumer
//!   host dead-letters it with reason `SignatureInvalid` and never retries.

use crate::errors::VerifyError;
use crate::token::{self, HASH_SHA256};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use shared_types::EventEnvelope;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// One key as served by the distribution endpoint (`GET /keys`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedKey {
    /// Key identifier referenced by envelope signatures.
    pub key_id: String,
    /// Signature algorithm this key verifies.
    pub algorithm: String,
    /// Raw public key material.
    pub public_key: Vec<u8>,
}

/// Port to the key-distribution endpoint.
#[async_trait]
pub trait KeyDistribution: Send + Sync {
    /// Fetch the current set of published keys.
    async fn fetch_keys(&self) -> Result<Vec<PublishedKey>, VerifyError>;
}

/// Key-ring configuration.
#[derive(Debug, Clone)]
pub struct KeyRingConfig {
    /// Maximum allowed skew between the signing timestamp and local time.
    pub max_clock_skew: Duration,
    /// How long a rotated-out key id remains valid after it disappears
    /// from the distribution set.
    pub rotation_overlap: Duration,
}

impl Default for KeyRingConfig {
    fn default() -> Self {
        Self {
            max_clock_skew: Duration::from_secs(300),
            rotation_overlap: Duration::from_secs(3600),
        }
    }
}

struct CachedKey {
    key: PublishedKey,
    /// Set when the key id disappears from the distribution set.
    retired_at: Option<Instant>,
}

/// Cached, rotation-aware verifier for envelope signatures.
pub struct KeyRing {
    source: Arc<dyn KeyDistribution>,
    config: KeyRingConfig,
    cache: RwLock<HashMap<String, CachedKey>>,
}

impl KeyRing {
    /// Create a key ring over the given distribution source.
    #[must_use]
    pub fn new(source: Arc<dyn KeyDistribution>, config: KeyRingConfig) -> Self {
        Self {
            source,
            config,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Pull the distribution set and reconcile the cache: new ids are
    /// admitted, ids missing from the set start their retirement clock,
    /// ids retired longer than the overlap window are purged.
    pub async fn refresh(&self) -> Result<(), VerifyError> {
        let published = self.source.fetch_keys().await?;
        let now = Instant::now();
        let mut cache = self.cache.write();

        for key in &published {
            cache.insert(
                key.key_id.clone(),
                CachedKey {
                    key: key.clone(),
                    retired_at: None,
                },
            );
        }

        let published_ids: Vec<&str> = published.iter().map(|k| k.key_id.as_str()).collect();
        for (kid, cached) in cache.iter_mut() {
            if !published_ids.contains(&kid.as_str()) && cached.retired_at.is_none() {
                info!(kid = %kid, "Key rotated out; starting overlap window");
                cached.retired_at = Some(now);
            }
        }

        let overlap = self.config.rotation_overlap;
        cache.retain(|kid, cached| match cached.retired_at {
            Some(retired) if now.duration_since(retired) > overlap => {
                warn!(kid = %kid, "Purging rotated key after overlap window");
                false
            }
            _ => true,
        });

        debug!(keys = cache.len(), "Key ring refreshed");
        Ok(())
    }

    /// Look up a key id, refreshing the cache once on a miss.
    async fn lookup(&self, kid: &str) -> Result<PublishedKey, VerifyError> {
        if let Some(key) = self.lookup_cached(kid) {
            return Ok(key);
        }

        self.refresh().await?;

        self.lookup_cached(kid).ok_or_else(|| VerifyError::UnknownKey {
            kid: kid.to_string(),
        })
    }

    fn lookup_cached(&self, kid: &str) -> Option<PublishedKey> {
        let cache = self.cache.read();
        let cached = cache.get(kid)?;
        if let Some(retired) = cached.retired_at {
            if retired.elapsed() > self.config.rotation_overlap {
                // Past overlap but not yet purged by a refresh: fail closed.
                return None;
            }
        }
        Some(cached.key.clone())
    }

    /// Verify an envelope's signature block against its canonical payload.
    ///
    /// Checks, in order: hash algorithm, clock skew, key id (with refresh on
    /// miss), algorithm match, signature. Any failure is fatal for the
    /// envelope.
    pub async fn verify_envelope(&self, envelope: &EventEnvelope) -> Result<(), VerifyError> {
        let sig = envelope.signature();

        if sig.hash_algorithm != HASH_SHA256 {
            return Err(VerifyError::UnsupportedHash(sig.hash_algorithm.clone()));
        }

        let skew = (Utc::now() - sig.timestamp_utc).num_seconds().abs();
        let max_skew = self.config.max_clock_skew.as_secs() as i64;
        if skew > max_skew {
            return Err(VerifyError::StaleTimestamp {
                skew_secs: skew,
                max_secs: max_skew,
            });
        }

        let key = self.lookup(&sig.key_id).await?;

        if key.algorithm != sig.algorithm {
            return Err(VerifyError::AlgorithmMismatch {
                envelope: sig.algorithm.clone(),
                key: key.algorithm,
                kid: sig.key_id.clone(),
            });
        }

        let input = token::signing_input_for(sig, envelope.detail_core())
            .map_err(|_| VerifyError::BadSignature)?;

        token::verify_signature(&sig.algorithm, &key.public_key, &input, &sig.signature)
            .map_err(|_| VerifyError::BadSignature)
    }
}

/// Static in-process key server, used by tests and single-node deployments.
pub struct StaticKeyServer {
    keys: RwLock<Vec<PublishedKey>>,
}

impl StaticKeyServer {
    /// Create a server holding the given keys.
    #[must_use]
    pub fn new(keys: Vec<PublishedKey>) -> Self {
        Self {
            keys: RwLock::new(keys),
        }
    }

    /// Replace the published key set (rotation).
    pub fn publish(&self, keys: Vec<PublishedKey>) {
        *self.keys.write() = keys;
    }
}

#[async_trait]
impl KeyDistribution for StaticKeyServer {
    async fn fetch_keys(&self) -> Result<Vec<PublishedKey>, VerifyError> {
        Ok(self.keys.read().clone())
    }
}
