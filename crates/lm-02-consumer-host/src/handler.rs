//! # Handler Registry
//!
//! Handlers register against an exact `(source, detailType)` pair. The host
//! resolves the pair from the verified envelope; there is no content-based
//! dispatch.

use async_trait::async_trait;
use shared_types::{DetailType, EventEnvelope, HandlerError};
use std::collections::HashMap;
use std::sync::Arc;

/// Business logic for one event shape.
///
/// Handlers must be idempotent: at-least-once delivery means the same
/// envelope can arrive more than once.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Process one verified envelope.
    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), HandlerError>;
}

/// Immutable-after-startup map from `(source, detailType)` to handler.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<(String, DetailType), Arc<dyn EventHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for an exact `(source, detailType)` pair.
    /// Re-registering the same pair replaces the previous handler.
    #[must_use]
    pub fn register(
        mut self,
        source: impl Into<String>,
        detail_type: DetailType,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        self.handlers.insert((source.into(), detail_type), handler);
        self
    }

    /// Resolve the handler for an envelope, if one is registered.
    #[must_use]
    pub fn resolve(&self, envelope: &EventEnvelope) -> Option<Arc<dyn EventHandler>> {
        self.handlers
            .get(&(
                envelope.source().to_string(),
                envelope.detail_type().clone(),
            ))
            .cloned()
    }

    /// Number of registered pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
