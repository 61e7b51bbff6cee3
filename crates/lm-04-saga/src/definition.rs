//! # Saga Definitions
//!
//! A definition is wiring: named steps in execution order, each with a
//! forward action and a compensating action. Definitions are immutable and
//! registered with the orchestrator at startup.

use async_trait::async_trait;
use serde_json::Value;
use shared_types::{HandlerError, TraceContext};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::instance::SagaInstance;

/// Read-only view of the saga a step action runs inside.
#[derive(Debug, Clone)]
pub struct SagaContext {
    /// Id of the running saga instance.
    pub saga_id: Uuid,
    /// Correlation context the saga was started with.
    pub trace: TraceContext,
    /// Business input the saga was started with.
    pub input: Value,
    /// Outputs of completed steps, by step name.
    outputs: HashMap<String, Value>,
}

impl SagaContext {
    pub(crate) fn for_instance(instance: &SagaInstance) -> Self {
        Self {
            saga_id: instance.saga_id,
            trace: instance.trace.clone(),
            input: instance.input.clone(),
            outputs: instance
                .completed
                .iter()
                .map(|r| (r.name.clone(), r.output.clone()))
                .collect(),
        }
    }

    /// Output of a previously completed step, if any.
    #[must_use]
    pub fn output_of(&self, step: &str) -> Option<&Value> {
        self.outputs.get(step)
    }
}

/// Forward and compensating behavior of one step.
///
/// Both directions must be idempotent: a crash between execution and
/// persistence means the orchestrator re-runs the direction in flight.
#[async_trait]
pub trait StepAction: Send + Sync {
    /// Run the step. The returned value is recorded on the instance and
    /// visible to later steps through [`SagaContext::output_of`].
    async fn execute(&self, ctx: &SagaContext) -> Result<Value, HandlerError>;

    /// Undo the step's effects. Runs only after `execute` succeeded.
    async fn compensate(&self, ctx: &SagaContext) -> Result<(), HandlerError>;
}

/// One step in a definition.
#[derive(Clone)]
pub struct StepDefinition {
    /// Unique step name within the definition.
    pub name: String,
    /// The step's behavior.
    pub action: Arc<dyn StepAction>,
    /// Per-step budget; `None` uses the orchestrator default.
    pub timeout: Option<Duration>,
}

/// An ordered, named saga flow.
pub struct SagaDefinition {
    /// Definition name, referenced when starting instances.
    pub name: String,
    /// Steps in execution order.
    pub steps: Vec<StepDefinition>,
}

impl SagaDefinition {
    /// Start building a definition.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step with the default timeout.
    #[must_use]
    pub fn step(mut self, name: impl Into<String>, action: Arc<dyn StepAction>) -> Self {
        self.steps.push(StepDefinition {
            name: name.into(),
            action,
            timeout: None,
        });
        self
    }

    /// Append a step with an explicit budget.
    #[must_use]
    pub fn step_with_timeout(
        mut self,
        name: impl Into<String>,
        action: Arc<dyn StepAction>,
        timeout: Duration,
    ) -> Self {
        self.steps.push(StepDefinition {
            name: name.into(),
            action,
            timeout: Some(timeout),
        });
        self
    }

    /// Look up a step by name.
    #[must_use]
    pub fn step_named(&self, name: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.name == name)
    }
}
