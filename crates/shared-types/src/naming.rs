//! # Event Naming
//!
//! Versioned detail-type identifiers and resource URNs.
//!
//! - `DetailType`: `"{Entity}.{Action}.v{N}"` — the stable, versioned name
//!   of a payload shape. Routing and handler registration key on this.
//! - `ResourceUrn`: `"urn:{service}:{entity}:{id}"` — names the business
//!   entity an event affects. The `id` segment doubles as the ordering-lane
//!   key for ledger-affecting queues.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors from parsing event names.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamingError {
    /// Detail type did not match `Entity.Action.vN`.
    #[error("Malformed detail type: {0:?} (expected \"Entity.Action.vN\")")]
    MalformedDetailType(String),

    /// Resource string did not match `urn:service:entity:id`.
    #[error("Malformed resource URN: {0:?} (expected \"urn:service:entity:id\")")]
    MalformedUrn(String),
}

/// Versioned, stable identifier for a payload shape: `"{Entity}.{Action}.v{N}"`.
///
/// Two envelopes with the same detail type carry the same payload shape.
/// A shape change means a new version, never a mutation of an existing one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DetailType {
    entity: String,
    action: String,
    version: u32,
}

impl DetailType {
    /// Parse a detail type from its canonical string form.
    pub fn parse(s: &str) -> Result<Self, NamingError> {
        let mut parts = s.split('.');
        let (Some(entity), Some(action), Some(version), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(NamingError::MalformedDetailType(s.to_string()));
        };

        if entity.is_empty() || action.is_empty() {
            return Err(NamingError::MalformedDetailType(s.to_string()));
        }

        let version = version
            .strip_prefix('v')
            .and_then(|n| n.parse::<u32>().ok())
            .ok_or_else(|| NamingError::MalformedDetailType(s.to_string()))?;

        Ok(Self {
            entity: entity.to_string(),
            action: action.to_string(),
            version,
        })
    }

    /// The entity segment (e.g. `"Payment"`).
    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// The action segment (e.g. `"Initiated"`).
    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }

    /// The shape version.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }
}

impl fmt::Display for DetailType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.v{}", self.entity, self.action, self.version)
    }
}

impl FromStr for DetailType {
    type Err = NamingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DetailType {
    type Error = NamingError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<DetailType> for String {
    fn from(dt: DetailType) -> Self {
        dt.to_string()
    }
}

/// URN naming the business entity an event affects:
/// `"urn:{service}:{entity}:{id}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceUrn {
    service: String,
    entity: String,
    id: String,
}

impl ResourceUrn {
    /// Parse a resource URN from its canonical string form.
    pub fn parse(s: &str) -> Result<Self, NamingError> {
        let mut parts = s.split(':');
        let (Some("urn"), Some(service), Some(entity), Some(id), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(NamingError::MalformedUrn(s.to_string()));
        };

        if service.is_empty() || entity.is_empty() || id.is_empty() {
            return Err(NamingError::MalformedUrn(s.to_string()));
        }

        Ok(Self {
            service: service.to_string(),
            entity: entity.to_string(),
            id: id.to_string(),
        })
    }

    /// Build a URN from its segments.
    pub fn new(service: &str, entity: &str, id: &str) -> Result<Self, NamingError> {
        Self::parse(&format!("urn:{service}:{entity}:{id}"))
    }

    /// The owning service segment.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// The entity kind segment.
    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// The business id segment. Ordered (FIFO) queues use this as the
    /// lane key so two events for the same entity are never reordered.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for ResourceUrn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "urn:{}:{}:{}", self.service, self.entity, self.id)
    }
}

impl FromStr for ResourceUrn {
    type Err = NamingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ResourceUrn {
    type Error = NamingError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<ResourceUrn> for String {
    fn from(urn: ResourceUrn) -> Self {
        urn.to_string()
    }
}
