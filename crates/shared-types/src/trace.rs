//! # Trace Context
//!
//! Correlation context carried by every envelope. The correlation id is the
//! journal's primary lookup key and links every hop of one logical operation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Correlation context for one logical operation.
///
/// The `correlation_id` is required and stable across every envelope that
/// belongs to the same operation. The optional ids identify the acting
/// user/tenant/device where known; downstream services must not treat their
/// absence as an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    /// Links all envelopes/journal entries of one logical operation.
    pub correlation_id: Uuid,

    /// Acting user, where known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Owning tenant, where known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,

    /// Originating device, where known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl TraceContext {
    /// Start a fresh trace with a new correlation id.
    #[must_use]
    pub fn new() -> Self {
        Self::with_correlation(Uuid::new_v4())
    }

    /// Continue an existing trace.
    #[must_use]
    pub fn with_correlation(correlation_id: Uuid) -> Self {
        Self {
            correlation_id,
            user_id: None,
            tenant_id: None,
            device_id: None,
        }
    }

    /// Attach the acting user id.
    #[must_use]
    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Attach the owning tenant id.
    #[must_use]
    pub fn tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Attach the originating device id.
    #[must_use]
    pub fn device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }
}

impl Default for TraceContext {
    fn default() -> Self {
        Self::new()
    }
}
