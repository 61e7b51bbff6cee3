//! # Rule-Based Routing
//!
//! A topic fans out to every queue whose binding rule matches the
//! envelope's `(source, detailType)` pair. Rules are declared once at
//! startup; there is no dynamic re-binding.

use shared_types::EventEnvelope;

/// Match criteria for one queue binding. `None` fields are wildcards.
#[derive(Debug, Clone, Default)]
pub struct RoutingRule {
    /// Emitting service to match, or any.
    pub source: Option<String>,
    /// Detail-type entity segment to match, or any.
    pub entity: Option<String>,
    /// Detail-type action segment to match, or any.
    pub action: Option<String>,
}

impl RoutingRule {
    /// Match everything (broadcast binding).
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Match one emitting service.
    #[must_use]
    pub fn from_source(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            ..Self::default()
        }
    }

    /// Match one entity kind (e.g. every `Payment.*` event).
    #[must_use]
    pub fn for_entity(entity: impl Into<String>) -> Self {
        Self {
            entity: Some(entity.into()),
            ..Self::default()
        }
    }

    /// Narrow to one action.
    #[must_use]
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Whether the envelope matches this rule.
    #[must_use]
    pub fn matches(&self, envelope: &EventEnvelope) -> bool {
        if let Some(source) = &self.source {
            if envelope.source() != source {
                return false;
            }
        }
        if let Some(entity) = &self.entity {
            if envelope.detail_type().entity() != entity {
                return false;
            }
        }
        if let Some(action) = &self.action {
            if envelope.detail_type().action() != action {
                return false;
            }
        }
        true
    }
}

/// Binds a queue to a topic under a routing rule.
#[derive(Debug, Clone)]
pub struct QueueBinding {
    /// Destination queue name.
    pub queue: String,
    /// Rule gating delivery into the queue.
    pub rule: RoutingRule,
    /// FIFO queue: deliveries within one resource-id lane are strictly
    /// ordered and never concurrent. Required for ledger-affecting types.
    pub fifo: bool,
}

impl QueueBinding {
    /// Standard (unordered) binding.
    #[must_use]
    pub fn new(queue: impl Into<String>, rule: RoutingRule) -> Self {
        Self {
            queue: queue.into(),
            rule,
            fifo: false,
        }
    }

    /// Ordered binding, laned by resource id.
    #[must_use]
    pub fn fifo(queue: impl Into<String>, rule: RoutingRule) -> Self {
        Self {
            queue: queue.into(),
            rule,
            fifo: true,
        }
    }
}
