//! # Saga Store
//!
//! Version-checked persistence for saga instances. Every save is a
//! compare-and-swap on the instance version; a conflict means another
//! orchestrator advanced the saga first.

use crate::instance::{SagaInstance, SagaState};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// Errors from saga persistence.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SagaStoreError {
    /// No instance with the given id.
    #[error("Unknown saga: {0}")]
    NotFound(Uuid),

    /// The instance was saved by someone else since it was loaded.
    #[error("Version conflict on saga {saga_id}: expected {expected}, stored {stored}")]
    VersionConflict {
        /// Contested instance.
        saga_id: Uuid,
        /// Version the caller loaded.
        expected: u64,
        /// Version actually stored.
        stored: u64,
    },

    /// The backing store is unreachable.
    #[error("Saga store unavailable: {0}")]
    Unavailable(String),
}

/// Durable saga-instance store.
#[async_trait]
pub trait SagaStore: Send + Sync {
    /// Persist an instance. The instance's `version` must equal the stored
    /// version (0 for a new instance); the returned copy carries the bumped
    /// version.
    async fn save(&self, instance: SagaInstance) -> Result<SagaInstance, SagaStoreError>;

    /// Load an instance by id.
    async fn load(&self, saga_id: Uuid) -> Result<SagaInstance, SagaStoreError>;

    /// Every instance not yet in a terminal state (crash-recovery sweep).
    async fn unfinished(&self) -> Result<Vec<SagaInstance>, SagaStoreError>;
}

/// In-memory reference implementation of [`SagaStore`].
#[derive(Default)]
pub struct InMemorySagaStore {
    instances: RwLock<HashMap<Uuid, SagaInstance>>,
}

impl InMemorySagaStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SagaStore for InMemorySagaStore {
    async fn save(&self, mut instance: SagaInstance) -> Result<SagaInstance, SagaStoreError> {
        let mut instances = self.instances.write();
        let stored_version = instances.get(&instance.saga_id).map(|i| i.version);

        match stored_version {
            None if instance.version != 0 => {
                return Err(SagaStoreError::NotFound(instance.saga_id));
            }
            Some(stored) if stored != instance.version => {
                return Err(SagaStoreError::VersionConflict {
                    saga_id: instance.saga_id,
                    expected: instance.version,
                    stored,
                });
            }
            _ => {}
        }

        instance.version += 1;
        instance.updated_at = chrono::Utc::now();
        instances.insert(instance.saga_id, instance.clone());
        Ok(instance)
    }

    async fn load(&self, saga_id: Uuid) -> Result<SagaInstance, SagaStoreError> {
        self.instances
            .read()
            .get(&saga_id)
            .cloned()
            .ok_or(SagaStoreError::NotFound(saga_id))
    }

    async fn unfinished(&self) -> Result<Vec<SagaInstance>, SagaStoreError> {
        Ok(self
            .instances
            .read()
            .values()
            .filter(|i| !i.state.is_terminal())
            .cloned()
            .collect())
    }
}
