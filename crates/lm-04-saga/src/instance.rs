//! # Saga Instances
//!
//! The persisted runtime state of one saga. Everything the orchestrator
//! needs to resume after a crash lives here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::TraceContext;
use uuid::Uuid;

/// Lifecycle of a saga instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SagaState {
    /// Executing forward steps.
    Running,
    /// Every step completed. Terminal.
    Completed,
    /// A step failed; undoing completed steps in reverse order.
    Compensating,
    /// Every completed step was undone. Terminal.
    Compensated,
    /// A compensation failed; the flow is partially undone. Terminal,
    /// requires operator intervention.
    Failed,
}

impl SagaState {
    /// Whether this state admits no further transitions.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Compensated | Self::Failed)
    }
}

/// A completed forward step awaiting potential compensation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// Step name within the definition.
    pub name: String,
    /// Value the step's execution returned.
    pub output: Value,
}

/// Persisted state of one saga run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaInstance {
    /// Unique instance id.
    pub saga_id: Uuid,
    /// Name of the definition this instance runs.
    pub definition: String,
    /// Current lifecycle state.
    pub state: SagaState,
    /// Completed steps in execution order. During compensation this list
    /// shrinks from the back; remaining entries are the undo backlog.
    pub completed: Vec<StepRecord>,
    /// Correlation context threaded through every step.
    pub trace: TraceContext,
    /// Business input the saga was started with.
    pub input: Value,
    /// Why the saga left `Running`, when it did.
    pub failure: Option<String>,
    /// Optimistic-concurrency version, bumped by every save.
    pub version: u64,
    /// Instance creation time.
    pub started_at: DateTime<Utc>,
    /// Last transition time.
    pub updated_at: DateTime<Utc>,
    /// Absolute budget for the forward path. Exceeding it is treated like
    /// a step failure: remaining steps are skipped and compensation runs.
    pub deadline: Option<DateTime<Utc>>,
}

impl SagaInstance {
    /// Fresh instance in `Running`, not yet persisted (version 0).
    #[must_use]
    pub fn new(definition: impl Into<String>, trace: TraceContext, input: Value) -> Self {
        let now = Utc::now();
        Self {
            saga_id: Uuid::new_v4(),
            definition: definition.into(),
            state: SagaState::Running,
            completed: Vec::new(),
            trace,
            input,
            failure: None,
            version: 0,
            started_at: now,
            updated_at: now,
            deadline: None,
        }
    }

    /// Whether the forward-path budget has run out.
    #[must_use]
    pub fn past_deadline(&self, now: DateTime<Utc>) -> bool {
        self.deadline.is_some_and(|deadline| now > deadline)
    }

    /// Record a step failure and enter compensation.
    pub fn begin_compensation(&mut self, failure: impl Into<String>) {
        self.state = SagaState::Compensating;
        self.failure = Some(failure.into());
    }

    /// Record a compensation failure and give up.
    pub fn fail(&mut self, failure: impl Into<String>) {
        self.state = SagaState::Failed;
        let failure = failure.into();
        self.failure = Some(match self.failure.take() {
            Some(existing) => format!("{existing}; {failure}"),
            None => failure,
        });
    }
}
