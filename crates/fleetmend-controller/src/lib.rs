//! fleetmend-controller: machine health-check remediation.
//!
//! Given a node event, the [`Reconciler`] finds the machine backing the
//! node, the health-check policy covering that machine, evaluates the node's
//! conditions and, once a node has been unhealthy for too long, hands the
//! machine to the [`RemediationEngine`] which reboots or deletes it inside
//! the group's disruption budget.
//!
//! # Architecture
//!
//! ```text
//! Trigger::Node ─────────► Reconciler::reconcile(node)
//!                              ├── selector::matches        (which policy)
//!                              ├── fleetmend_health::evaluate
//!                              └── RemediationEngine        (reboot / delete)
//!                                     └── BudgetCoordinator
//!
//! Trigger::HealthCheck ──► Reconciler::map_policy_change → node triggers
//! ```
//!
//! Nothing here blocks or sleeps. Re-checks come back as
//! `Reconciled::requeue_after` for the caller to schedule.

pub mod error;
pub mod reconciler;
pub mod remediation;
pub mod selector;
pub mod trigger;

pub use error::{ReconcileError, ReconcileResult};
pub use reconciler::{
    DEFAULT_BUDGET_COOLDOWN, DEFAULT_NAMESPACE, FindingReport, NodeReport, Outcome, Reconciled,
    Reconciler, ReconcilerConfig, ReportStatus, parse_machine_ref,
};
pub use remediation::{Remediation, RemediationEngine, RemediationOutcome, RemediationPhase};
pub use selector::{LabelMatcher, SelectorError, matches, nodes_for_policy, policy_matcher};
pub use trigger::Trigger;
