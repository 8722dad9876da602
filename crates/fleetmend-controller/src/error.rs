//! Error types for node reconciliation.
//!
//! Every variant is scoped to a single reconcile and means "retry". The
//! dispatcher uses [`ReconcileError::requeue_immediately`] to tell write
//! races (retry now) from everything else (retry with backoff).

use thiserror::Error;

use fleetmend_disruption::BudgetError;
use fleetmend_health::ConditionsError;
use fleetmend_state::StateError;

/// Result type alias for reconcile operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("state store error: {0}")]
    State(StateError),

    /// Lost an optimistic-concurrency race on `key`.
    #[error("write conflict on {key}")]
    Conflict { key: String },

    /// The node's machine annotation is not a `namespace/name` reference.
    #[error("node {node} has malformed machine reference {value:?}")]
    MalformedReference { node: String, value: String },

    #[error(transparent)]
    Conditions(#[from] ConditionsError),

    #[error(transparent)]
    Budget(BudgetError),
}

impl ReconcileError {
    /// Whether the reconcile should be retried without delay.
    pub fn requeue_immediately(&self) -> bool {
        matches!(self, ReconcileError::Conflict { .. })
    }
}

impl From<StateError> for ReconcileError {
    fn from(e: StateError) -> Self {
        match e {
            StateError::Conflict { key, .. } => ReconcileError::Conflict { key },
            other => ReconcileError::State(other),
        }
    }
}

impl From<BudgetError> for ReconcileError {
    fn from(e: BudgetError) -> Self {
        match e {
            BudgetError::Conflict { group, .. } => ReconcileError::Conflict {
                key: group.to_string(),
            },
            BudgetError::State(state) => state.into(),
            other => ReconcileError::Budget(other),
        }
    }
}
