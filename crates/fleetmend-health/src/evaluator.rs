//! Health evaluator: how long has a node been unhealthy, and is it long enough.
//!
//! A pure function of (node conditions, policies, now). Durations are always
//! measured from the condition's `last_transition_time`, so repeated
//! evaluations converge on the threshold without keeping any state.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use fleetmend_state::{ConditionStatus, Node};

use crate::conditions::UnhealthyCondition;

/// Margin added to every pending re-check delay.
pub const RECHECK_GUARD: Duration = Duration::from_secs(1);

/// A monitored condition currently in its unhealthy status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnhealthyFinding {
    pub condition_type: String,
    pub status: ConditionStatus,
    pub timeout: Duration,
    /// Time spent in the unhealthy status so far.
    pub elapsed: Duration,
}

impl UnhealthyFinding {
    /// Whether the condition has been unhealthy for at least its timeout.
    pub fn is_actionable(&self) -> bool {
        self.elapsed >= self.timeout
    }

    /// Delay before this condition can become actionable, guard included.
    pub fn recheck_after(&self) -> Duration {
        self.timeout.saturating_sub(self.elapsed) + RECHECK_GUARD
    }
}

/// Outcome of evaluating one node against the unhealthy condition policies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    /// No monitored condition is in its unhealthy status.
    Healthy,
    /// A condition has been unhealthy for at least its timeout.
    ActionableUnhealthy(UnhealthyFinding),
    /// Unhealthy, but no condition has reached its timeout yet.
    PendingUnhealthy {
        min_wait: Duration,
        /// The condition closest to its timeout.
        next: UnhealthyFinding,
    },
}

/// Every monitored condition currently in its unhealthy status, in policy order.
///
/// A policy entry is skipped when the node has no condition of that type or
/// when the condition's current status differs from the policy's.
pub fn unhealthy_findings(
    node: &Node,
    conditions: &[UnhealthyCondition],
    now: DateTime<Utc>,
) -> Vec<UnhealthyFinding> {
    conditions
        .iter()
        .filter_map(|policy| {
            let observed = node.condition(&policy.condition_type)?;
            if observed.status != policy.status {
                return None;
            }
            // Transition times in the future (clock skew) count as zero.
            let elapsed = (now - observed.last_transition_time)
                .to_std()
                .unwrap_or(Duration::ZERO);
            Some(UnhealthyFinding {
                condition_type: policy.condition_type.clone(),
                status: policy.status,
                timeout: policy.timeout,
                elapsed,
            })
        })
        .collect()
}

/// Evaluate a node at `now`.
pub fn evaluate(node: &Node, conditions: &[UnhealthyCondition], now: DateTime<Utc>) -> Evaluation {
    let findings = unhealthy_findings(node, conditions, now);

    if let Some(actionable) = findings.iter().find(|f| f.is_actionable()) {
        debug!(
            node = %node.name,
            condition = %actionable.condition_type,
            status = %actionable.status,
            elapsed = ?actionable.elapsed,
            timeout = ?actionable.timeout,
            "condition unhealthy for too long"
        );
        return Evaluation::ActionableUnhealthy(actionable.clone());
    }

    match findings.into_iter().min_by_key(UnhealthyFinding::recheck_after) {
        Some(next) => Evaluation::PendingUnhealthy {
            min_wait: next.recheck_after(),
            next,
        },
        None => Evaluation::Healthy,
    }
}
