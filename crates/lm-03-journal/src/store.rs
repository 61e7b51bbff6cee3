//! # Journal Contract
//!
//! Append-only store trait plus the fire-and-forget append helper used on
//! dispatch hot paths.

use crate::entry::JournalEntry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared_types::ResourceUrn;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

/// Half-open time window over `recorded_at`, unbounded ends allowed.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeRange {
    /// Inclusive lower bound.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub to: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// The unbounded range.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Everything recorded at or after `from`.
    #[must_use]
    pub fn since(from: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: None,
        }
    }

    /// Whether the instant falls inside the window.
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| at >= from) && self.to.map_or(true, |to| at < to)
    }
}

/// Errors from journal operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JournalError {
    /// The backing store rejected or lost the write.
    #[error("Journal store unavailable: {0}")]
    Unavailable(String),
}

/// Append-only, query-by-correlation journal store.
#[async_trait]
pub trait Journal: Send + Sync {
    /// Append one entry. Entries are immutable after this call.
    async fn append(&self, entry: JournalEntry) -> Result<(), JournalError>;

    /// Every entry for one business flow, oldest first.
    async fn by_correlation(&self, correlation_id: Uuid) -> Result<Vec<JournalEntry>, JournalError>;

    /// Every entry touching one business entity within the window, oldest
    /// first.
    async fn by_resource(
        &self,
        resource: &ResourceUrn,
        range: TimeRange,
    ) -> Result<Vec<JournalEntry>, JournalError>;
}

/// Delay before the single re-append attempt.
const APPEND_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Append without waiting and without propagating failure.
///
/// The journal is advisory: dispatch must proceed whether or not the entry
/// lands. A failed append is retried once off the hot path; a second
/// failure surfaces in logs only.
pub fn spawn_append(journal: Arc<dyn Journal>, entry: JournalEntry) {
    tokio::spawn(async move {
        let correlation_id = entry.correlation_id;
        if journal.append(entry.clone()).await.is_ok() {
            return;
        }
        tokio::time::sleep(APPEND_RETRY_DELAY).await;
        if let Err(e) = journal.append(entry).await {
            warn!(%correlation_id, error = %e, "Journal append dropped");
        }
    });
}
