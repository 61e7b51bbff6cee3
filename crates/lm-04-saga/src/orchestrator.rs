//! # Orchestrator
//!
//! Drives instances through their definitions. Every transition is saved
//! before the next side effect runs, so the worst a crash can cost is one
//! re-run of an idempotent step.

use crate::definition::{SagaContext, SagaDefinition, StepDefinition};
use crate::instance::{SagaInstance, SagaState};
use crate::store::{SagaStore, SagaStoreError};
use serde_json::Value;
use shared_types::{SagaConfig, TraceContext};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

/// Infrastructure errors from driving a saga. Business failures are not
/// errors: they surface as `Compensated` or `Failed` instance states.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SagaError {
    /// No definition registered under the given name.
    #[error("Unknown saga definition: {0}")]
    UnknownDefinition(String),

    /// Persistence failed; the saga stays where it was last saved.
    #[error("Saga store failure: {0}")]
    Store(#[from] SagaStoreError),
}

/// Registry of definitions plus the driving loop.
pub struct SagaOrchestrator {
    definitions: HashMap<String, Arc<SagaDefinition>>,
    store: Arc<dyn SagaStore>,
    config: SagaConfig,
}

impl SagaOrchestrator {
    /// Create an orchestrator over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn SagaStore>, config: SagaConfig) -> Self {
        Self {
            definitions: HashMap::new(),
            store,
            config,
        }
    }

    /// Register a definition. Call once per flow at startup.
    #[must_use]
    pub fn with_definition(mut self, definition: SagaDefinition) -> Self {
        self.definitions
            .insert(definition.name.clone(), Arc::new(definition));
        self
    }

    /// Start a new instance and drive it to a terminal state. The returned
    /// instance's `state` tells the business outcome.
    pub async fn start(
        &self,
        definition: &str,
        trace: TraceContext,
        input: Value,
    ) -> Result<SagaInstance, SagaError> {
        let def = self
            .definitions
            .get(definition)
            .ok_or_else(|| SagaError::UnknownDefinition(definition.to_string()))?
            .clone();

        let mut instance = SagaInstance::new(def.name.clone(), trace, input);
        if let Some(budget) = self.config.saga_deadline {
            if let Ok(budget) = chrono::Duration::from_std(budget) {
                instance.deadline = Some(instance.started_at + budget);
            }
        }
        let instance = self.store.save(instance).await?;
        info!(
            saga_id = %instance.saga_id,
            definition = %def.name,
            correlation_id = %instance.trace.correlation_id,
            "Saga started"
        );
        self.drive(&def, instance).await
    }

    /// Pick up an instance after a crash and drive it to a terminal state.
    /// Terminal instances are returned unchanged.
    pub async fn resume(&self, saga_id: Uuid) -> Result<SagaInstance, SagaError> {
        let instance = self.store.load(saga_id).await?;
        if instance.state.is_terminal() {
            return Ok(instance);
        }

        let def = self
            .definitions
            .get(&instance.definition)
            .ok_or_else(|| SagaError::UnknownDefinition(instance.definition.clone()))?
            .clone();
        info!(saga_id = %instance.saga_id, state = ?instance.state, "Saga resumed");

        match instance.state {
            SagaState::Running => self.drive(&def, instance).await,
            SagaState::Compensating => self.compensate(&def, instance).await,
            _ => Ok(instance),
        }
    }

    /// Resume every unfinished instance (startup sweep).
    pub async fn resume_all(&self) -> Result<Vec<SagaInstance>, SagaError> {
        let mut results = Vec::new();
        for instance in self.store.unfinished().await? {
            results.push(self.resume(instance.saga_id).await?);
        }
        Ok(results)
    }

    async fn drive(
        &self,
        def: &SagaDefinition,
        mut instance: SagaInstance,
    ) -> Result<SagaInstance, SagaError> {
        while instance.state == SagaState::Running {
            let Some(step) = def.steps.get(instance.completed.len()) else {
                instance.state = SagaState::Completed;
                let instance = self.store.save(instance).await?;
                info!(saga_id = %instance.saga_id, steps = instance.completed.len(), "Saga completed");
                return Ok(instance);
            };

            if instance.past_deadline(chrono::Utc::now()) {
                warn!(
                    saga_id = %instance.saga_id,
                    step = %step.name,
                    "Saga deadline exceeded; compensating"
                );
                instance.begin_compensation(format!(
                    "step {}: saga deadline exceeded",
                    step.name
                ));
                instance = self.store.save(instance).await?;
                continue;
            }

            let ctx = SagaContext::for_instance(&instance);
            match self.execute_step(step, &ctx).await {
                Ok(output) => {
                    instance.completed.push(crate::instance::StepRecord {
                        name: step.name.clone(),
                        output,
                    });
                    instance = self.store.save(instance).await?;
                }
                Err(reason) => {
                    warn!(
                        saga_id = %instance.saga_id,
                        step = %step.name,
                        reason = %reason,
                        "Saga step failed; compensating"
                    );
                    instance.begin_compensation(reason);
                    instance = self.store.save(instance).await?;
                }
            }
        }

        self.compensate(def, instance).await
    }

    async fn execute_step(&self, step: &StepDefinition, ctx: &SagaContext) -> Result<Value, String> {
        let budget = step.timeout.unwrap_or(self.config.default_step_timeout);
        match timeout(budget, step.action.execute(ctx)).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(format!("step {}: {e}", step.name)),
            Err(_) => Err(format!("step {}: timed out after {budget:?}", step.name)),
        }
    }

    async fn compensate(
        &self,
        def: &SagaDefinition,
        mut instance: SagaInstance,
    ) -> Result<SagaInstance, SagaError> {
        while instance.state == SagaState::Compensating {
            let Some(step_name) = instance.completed.last().map(|r| r.name.clone()) else {
                instance.state = SagaState::Compensated;
                let instance = self.store.save(instance).await?;
                info!(saga_id = %instance.saga_id, "Saga compensated");
                return Ok(instance);
            };

            let Some(step) = def.step_named(&step_name) else {
                // Definition drifted under a persisted instance.
                instance.fail(format!("compensation {step_name}: step no longer defined"));
                let instance = self.store.save(instance).await?;
                warn!(saga_id = %instance.saga_id, "Saga failed: definition drift");
                return Ok(instance);
            };

            let ctx = SagaContext::for_instance(&instance);
            let budget = step.timeout.unwrap_or(self.config.default_step_timeout);
            let outcome = match timeout(budget, step.action.compensate(&ctx)).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(format!("compensation {}: {e}", step.name)),
                Err(_) => Err(format!("compensation {}: timed out after {budget:?}", step.name)),
            };

            match outcome {
                Ok(()) => {
                    instance.completed.pop();
                    instance = self.store.save(instance).await?;
                }
                Err(reason) => {
                    warn!(
                        saga_id = %instance.saga_id,
                        reason = %reason,
                        "Saga compensation failed; flow needs operator attention"
                    );
                    instance.fail(reason);
                    let instance = self.store.save(instance).await?;
                    return Ok(instance);
                }
            }
        }

        Ok(instance)
    }
}
