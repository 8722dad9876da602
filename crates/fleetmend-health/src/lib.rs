//! fleetmend-health: deciding whether a node is unhealthy, and for how long.
//!
//! Two pieces:
//!
//! - **`conditions`**: the condition store. Loads the configured
//!   `(condition type, status, timeout)` policies from the
//!   `node-unhealthy-conditions` config resource, falling back to a built-in
//!   default when the resource does not exist.
//! - **`evaluator`**: a pure function of (node conditions, policies, now)
//!   that reports `Healthy`, `ActionableUnhealthy` or `PendingUnhealthy` with
//!   the delay until the next check is worth running.
//!
//! # Timing
//!
//! ```text
//!   last_transition_time            + timeout
//!   |-------------- pending ---------|---- actionable ---->
//!          now ^   min_wait = (timeout - elapsed) + 1s
//! ```
//!
//! The extra second keeps a re-check from landing just before the threshold
//! because of clock rounding.

pub mod conditions;
pub mod evaluator;

pub use conditions::{
    ConditionStore, ConditionsError, ConditionsResult, UnhealthyCondition, default_conditions,
    parse_conditions, parse_duration,
};
pub use evaluator::{Evaluation, RECHECK_GUARD, UnhealthyFinding, evaluate, unhealthy_findings};
