//! # In-Memory Journal
//!
//! Reference implementation of [`Journal`]. A production deployment swaps
//! in a durable append-only store behind the same trait.

use crate::entry::JournalEntry;
use crate::store::{Journal, JournalError, TimeRange};
use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::ResourceUrn;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Default)]
struct JournalState {
    entries: Vec<JournalEntry>,
    by_correlation: HashMap<Uuid, Vec<usize>>,
    by_resource: HashMap<String, Vec<usize>>,
}

/// In-memory append-only journal with correlation and resource indexes.
#[derive(Default)]
pub struct InMemoryJournal {
    state: RwLock<JournalState>,
}

impl InMemoryJournal {
    /// Create an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total entries appended so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Whether nothing has been appended yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Journal for InMemoryJournal {
    async fn append(&self, entry: JournalEntry) -> Result<(), JournalError> {
        let mut state = self.state.write();
        let idx = state.entries.len();
        state
            .by_correlation
            .entry(entry.correlation_id)
            .or_default()
            .push(idx);
        state
            .by_resource
            .entry(entry.resource.to_string())
            .or_default()
            .push(idx);
        state.entries.push(entry);
        Ok(())
    }

    async fn by_correlation(
        &self,
        correlation_id: Uuid,
    ) -> Result<Vec<JournalEntry>, JournalError> {
        let state = self.state.read();
        let mut flow: Vec<JournalEntry> = state
            .by_correlation
            .get(&correlation_id)
            .map(|indexes| {
                indexes
                    .iter()
                    .map(|&i| state.entries[i].clone())
                    .collect()
            })
            .unwrap_or_default();
        // Appends are asynchronous, so insertion order is not event order.
        flow.sort_by_key(|e| e.recorded_at);
        Ok(flow)
    }

    async fn by_resource(
        &self,
        resource: &ResourceUrn,
        range: TimeRange,
    ) -> Result<Vec<JournalEntry>, JournalError> {
        let state = self.state.read();
        let mut entries: Vec<JournalEntry> = state
            .by_resource
            .get(&resource.to_string())
            .map(|indexes| {
                indexes
                    .iter()
                    .map(|&i| &state.entries[i])
                    .filter(|e| range.contains(e.recorded_at))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        entries.sort_by_key(|e| e.recorded_at);
        Ok(entries)
    }
}
