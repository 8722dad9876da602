//! Reconciler: turns one node event into at most one remediation.
//!
//! `reconcile` walks node → machine → health check → evaluation and hands
//! actionable-unhealthy machines to the [`RemediationEngine`]. It never
//! sleeps: a node that needs another look comes back with `requeue_after`
//! set, and the dispatcher owns the timer.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use fleetmend_disruption::{BudgetCoordinator, DEFAULT_MAX_ATTEMPTS};
use fleetmend_health::{
    ConditionStore, ConditionsError, Evaluation, UnhealthyCondition, default_conditions, evaluate,
    unhealthy_findings,
};
use fleetmend_metrics::{Counter, RemediationAction, RemediationMetrics};
use fleetmend_state::{
    ConditionStatus, FleetClient, Machine, MachineHealthCheck, Node, NodeName, RemediationStrategy,
};

use crate::error::{ReconcileError, ReconcileResult};
use crate::remediation::{RemediationEngine, RemediationOutcome};
use crate::selector;

/// Namespace holding the unhealthy conditions config resource by default.
pub const DEFAULT_NAMESPACE: &str = "fleet-system";

/// Wait before re-checking a node whose remediation hit an exhausted budget.
pub const DEFAULT_BUDGET_COOLDOWN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Namespace of the unhealthy conditions config resource.
    pub namespace: String,
    pub budget_cooldown: Duration,
    pub budget_max_attempts: u32,
    /// Evaluate with the default policy instead of failing when the
    /// conditions config is malformed. On by default; turning it off makes
    /// a malformed config a retryable reconcile error.
    pub fallback_on_malformed_conditions: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            budget_cooldown: DEFAULT_BUDGET_COOLDOWN,
            budget_max_attempts: DEFAULT_MAX_ATTEMPTS,
            fallback_on_malformed_conditions: true,
        }
    }
}

/// Where a reconcile ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    NodeNotFound,
    /// The node carries no machine annotation.
    NoMachineReference,
    MachineNotFound { machine: String },
    NoMatchingHealthCheck { machine: String },
    Healthy,
    /// Unhealthy, not yet for long enough.
    Pending { condition: String, min_wait: Duration },
    Remediated(RemediationOutcome),
}

/// Result of a successful reconcile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub outcome: Outcome,
    /// Reconcile this node again after the delay.
    pub requeue_after: Option<Duration>,
}

impl Reconciled {
    fn done(outcome: Outcome) -> Self {
        Self {
            outcome,
            requeue_after: None,
        }
    }
}

/// Dry-run view of how a node evaluates right now.
#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    pub node: NodeName,
    pub machine: Option<String>,
    pub health_check: Option<String>,
    pub strategy: Option<RemediationStrategy>,
    pub status: ReportStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_wait_secs: Option<u64>,
    pub findings: Vec<FindingReport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// No matching health check covers the node.
    Unmonitored,
    Healthy,
    Pending,
    Actionable,
}

#[derive(Debug, Clone, Serialize)]
pub struct FindingReport {
    pub condition: String,
    pub status: ConditionStatus,
    pub timeout_secs: u64,
    pub elapsed_secs: u64,
    pub actionable: bool,
}

/// Node → machine → policy resolution.
enum Target {
    NoReference,
    MachineNotFound(String),
    NoPolicy(Machine),
    Matched {
        machine: Machine,
        policy: MachineHealthCheck,
    },
}

pub struct Reconciler {
    client: Arc<dyn FleetClient>,
    conditions: ConditionStore,
    remediation: RemediationEngine,
    config: ReconcilerConfig,
    metrics: Arc<RemediationMetrics>,
}

impl Reconciler {
    pub fn new(client: Arc<dyn FleetClient>, config: ReconcilerConfig) -> Self {
        let budget =
            BudgetCoordinator::with_max_attempts(client.clone(), config.budget_max_attempts);
        Self {
            conditions: ConditionStore::new(client.clone(), &config.namespace),
            remediation: RemediationEngine::new(client.clone(), budget, config.budget_cooldown),
            client,
            config,
            metrics: Arc::new(RemediationMetrics::new()),
        }
    }

    /// Report into shared counters instead of private ones.
    pub fn with_metrics(mut self, metrics: Arc<RemediationMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<RemediationMetrics> {
        &self.metrics
    }

    pub fn client(&self) -> &Arc<dyn FleetClient> {
        &self.client
    }

    /// Reconcile one node against the current time.
    pub fn reconcile(&self, node_name: &str) -> ReconcileResult<Reconciled> {
        self.reconcile_at(node_name, Utc::now())
    }

    /// Reconcile one node, measuring unhealthy durations up to `now`.
    pub fn reconcile_at(&self, node_name: &str, now: DateTime<Utc>) -> ReconcileResult<Reconciled> {
        let result = self.run(node_name, now);
        self.record(&result);
        if let Err(e) = &result {
            match e {
                ReconcileError::MalformedReference { .. } => {
                    error!(node = %node_name, error = %e, "reconcile failed")
                }
                _ => warn!(node = %node_name, error = %e, "reconcile failed, will retry"),
            }
        }
        result
    }

    fn run(&self, node_name: &str, now: DateTime<Utc>) -> ReconcileResult<Reconciled> {
        debug!(node = %node_name, "reconciling node");
        let Some(node) = self.client.get_node(node_name)? else {
            debug!(node = %node_name, "node not found");
            return Ok(Reconciled::done(Outcome::NodeNotFound));
        };

        let (machine, policy) = match self.resolve(&node)? {
            Target::NoReference => return Ok(Reconciled::done(Outcome::NoMachineReference)),
            Target::MachineNotFound(machine) => {
                return Ok(Reconciled::done(Outcome::MachineNotFound { machine }));
            }
            Target::NoPolicy(machine) => {
                return Ok(Reconciled::done(Outcome::NoMatchingHealthCheck {
                    machine: machine.table_key(),
                }));
            }
            Target::Matched { machine, policy } => (machine, policy),
        };

        let conditions = self.load_conditions()?;
        match evaluate(&node, &conditions, now) {
            Evaluation::Healthy => {
                info!(node = %node.name, machine = %machine.table_key(), "node is healthy");
                Ok(Reconciled::done(Outcome::Healthy))
            }
            Evaluation::PendingUnhealthy { min_wait, next } => {
                warn!(
                    node = %node.name,
                    machine = %machine.table_key(),
                    condition = %next.condition_type,
                    status = %next.status,
                    elapsed = ?next.elapsed,
                    timeout = ?next.timeout,
                    requeue_after = ?min_wait,
                    "node unhealthy, re-checking later"
                );
                Ok(Reconciled {
                    outcome: Outcome::Pending {
                        condition: next.condition_type,
                        min_wait,
                    },
                    requeue_after: Some(min_wait),
                })
            }
            Evaluation::ActionableUnhealthy(finding) => {
                info!(
                    node = %node.name,
                    machine = %machine.table_key(),
                    health_check = %policy.table_key(),
                    condition = %finding.condition_type,
                    elapsed = ?finding.elapsed,
                    "node unhealthy for too long, remediating"
                );
                let outcome = self.remediation.remediate(node, machine, policy.strategy())?;
                let requeue_after = match &outcome {
                    RemediationOutcome::BudgetDeferred { retry_after, .. } => Some(*retry_after),
                    _ => None,
                };
                Ok(Reconciled {
                    outcome: Outcome::Remediated(outcome),
                    requeue_after,
                })
            }
        }
    }

    fn resolve(&self, node: &Node) -> ReconcileResult<Target> {
        let Some(reference) = node.machine_ref() else {
            debug!(node = %node.name, "no machine annotation");
            return Ok(Target::NoReference);
        };
        let Some((namespace, name)) = parse_machine_ref(reference) else {
            return Err(ReconcileError::MalformedReference {
                node: node.name.clone(),
                value: reference.to_string(),
            });
        };

        let Some(machine) = self.client.get_machine(namespace, name)? else {
            info!(node = %node.name, machine = %reference, "machine not found");
            return Ok(Target::MachineNotFound(reference.to_string()));
        };

        let mut policies = self.client.list_health_checks(&machine.namespace)?;
        policies.sort_by(|a, b| a.name.cmp(&b.name));
        let matched = policies
            .into_iter()
            .filter(|policy| !policy.is_being_deleted())
            .find(|policy| selector::matches(policy, &machine));

        match matched {
            Some(policy) => {
                debug!(
                    machine = %machine.table_key(),
                    health_check = %policy.table_key(),
                    "machine has a matching health check"
                );
                Ok(Target::Matched { machine, policy })
            }
            None => {
                debug!(machine = %machine.table_key(), "no health check covers machine");
                Ok(Target::NoPolicy(machine))
            }
        }
    }

    fn load_conditions(&self) -> ReconcileResult<Vec<UnhealthyCondition>> {
        match self.conditions.load() {
            Ok(conditions) => Ok(conditions),
            Err(ConditionsError::Parse { resource, reason })
                if self.config.fallback_on_malformed_conditions =>
            {
                warn!(
                    %resource,
                    %reason,
                    "malformed unhealthy conditions, evaluating with defaults"
                );
                Ok(default_conditions())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Nodes to reconcile after a health-check policy changed.
    ///
    /// A missing or terminating policy yields nothing; lookup failures are
    /// logged and also yield nothing.
    pub fn map_policy_change(&self, namespace: &str, name: &str) -> BTreeSet<NodeName> {
        let policy = match self.client.get_health_check(namespace, name) {
            Ok(Some(policy)) => policy,
            Ok(None) => {
                debug!(%namespace, %name, "health check gone, nothing to fan out");
                return BTreeSet::new();
            }
            Err(e) => {
                error!(%namespace, %name, error = %e, "failed to get health check");
                return BTreeSet::new();
            }
        };
        if policy.is_being_deleted() {
            debug!(health_check = %policy.table_key(), "health check terminating");
            return BTreeSet::new();
        }

        match selector::nodes_for_policy(self.client.as_ref(), &policy) {
            Ok(nodes) => {
                debug!(
                    health_check = %policy.table_key(),
                    nodes = nodes.len(),
                    "health check changed, fanning out"
                );
                nodes
            }
            Err(e) => {
                error!(health_check = %policy.table_key(), error = %e, "failed to list machines");
                BTreeSet::new()
            }
        }
    }

    /// Evaluate a node without remediating it. `None` if the node is unknown.
    pub fn evaluate_node(
        &self,
        node_name: &str,
        now: DateTime<Utc>,
    ) -> ReconcileResult<Option<NodeReport>> {
        let Some(node) = self.client.get_node(node_name)? else {
            return Ok(None);
        };

        let mut report = NodeReport {
            node: node.name.clone(),
            machine: node.machine_ref().map(str::to_string),
            health_check: None,
            strategy: None,
            status: ReportStatus::Unmonitored,
            min_wait_secs: None,
            findings: Vec::new(),
        };
        let Target::Matched { policy, .. } = self.resolve(&node)? else {
            return Ok(Some(report));
        };
        report.health_check = Some(policy.table_key());
        report.strategy = Some(policy.strategy());

        let conditions = self.load_conditions()?;
        report.findings = unhealthy_findings(&node, &conditions, now)
            .into_iter()
            .map(|f| FindingReport {
                actionable: f.is_actionable(),
                condition: f.condition_type,
                status: f.status,
                timeout_secs: f.timeout.as_secs(),
                elapsed_secs: f.elapsed.as_secs(),
            })
            .collect();
        match evaluate(&node, &conditions, now) {
            Evaluation::Healthy => report.status = ReportStatus::Healthy,
            Evaluation::ActionableUnhealthy(_) => report.status = ReportStatus::Actionable,
            Evaluation::PendingUnhealthy { min_wait, .. } => {
                report.status = ReportStatus::Pending;
                report.min_wait_secs = Some(min_wait.as_secs());
            }
        }
        Ok(Some(report))
    }

    fn record(&self, result: &ReconcileResult<Reconciled>) {
        let metrics = &self.metrics;
        metrics.record(Counter::Reconciles);
        let outcome = match result {
            Ok(reconciled) => &reconciled.outcome,
            Err(_) => {
                metrics.record(Counter::Errors);
                return;
            }
        };
        match outcome {
            Outcome::Healthy => metrics.record(Counter::Healthy),
            Outcome::Pending { .. } => metrics.record(Counter::Pending),
            Outcome::Remediated(remediated) => match remediated {
                RemediationOutcome::MachineDeleted { group } => {
                    metrics.record_remediation(&group.to_string(), RemediationAction::Delete)
                }
                RemediationOutcome::RebootRequested { group } => {
                    metrics.record_remediation(&group.to_string(), RemediationAction::Reboot)
                }
                RemediationOutcome::BudgetDeferred { .. } => {
                    metrics.record(Counter::BudgetDeferrals)
                }
                RemediationOutcome::SkippedControlPlane => {
                    metrics.record(Counter::ControlPlaneSkips)
                }
                RemediationOutcome::NotOwned => metrics.record(Counter::UnownedSkips),
                RemediationOutcome::RebootAlreadyPending | RemediationOutcome::AlreadyGone => {}
            },
            Outcome::NodeNotFound
            | Outcome::NoMachineReference
            | Outcome::MachineNotFound { .. }
            | Outcome::NoMatchingHealthCheck { .. } => {}
        }
    }
}

/// Split a `namespace/name` machine reference.
///
/// A bare name has an empty namespace. Empty names and extra slashes are
/// rejected.
pub fn parse_machine_ref(value: &str) -> Option<(&str, &str)> {
    let mut parts = value.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(name), None, None) if !name.is_empty() => Some(("", name)),
        (Some(namespace), Some(name), None) if !name.is_empty() => Some((namespace, name)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use fleetmend_state::{
        ConfigResource, LabelSelector, MACHINE_ANNOTATION, NodeCondition, NodeReference,
        OwnerReference, StateStore,
    };

    fn now() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn worker_labels() -> fleetmend_state::Labels {
        [("role".to_string(), "worker".to_string())].into()
    }

    /// A node backed by an owned worker machine, Ready=Unknown for `secs_ago`.
    fn seed(store: &StateStore, node: &str, secs_ago: i64) {
        let machine = format!("m-{node}");
        store
            .put_machine(&Machine {
                namespace: "fleet".to_string(),
                name: machine.clone(),
                labels: worker_labels(),
                owner_references: vec![OwnerReference {
                    kind: "MachineSet".to_string(),
                    name: "workers".to_string(),
                    controller: true,
                }],
                node_ref: Some(NodeReference {
                    name: node.to_string(),
                }),
                ..Default::default()
            })
            .unwrap();
        store
            .put_node(&Node {
                name: node.to_string(),
                annotations: [(MACHINE_ANNOTATION.to_string(), format!("fleet/{machine}"))].into(),
                conditions: vec![NodeCondition {
                    condition_type: "Ready".to_string(),
                    status: ConditionStatus::Unknown,
                    last_transition_time: now() - TimeDelta::seconds(secs_ago),
                    reason: None,
                    message: None,
                }],
                ..Default::default()
            })
            .unwrap();
    }

    fn put_policy(store: &StateStore, name: &str) {
        store
            .put_health_check(&MachineHealthCheck {
                namespace: "fleet".to_string(),
                name: name.to_string(),
                selector: LabelSelector {
                    match_labels: worker_labels(),
                    ..Default::default()
                },
                ..Default::default()
            })
            .unwrap();
    }

    fn reconciler(store: &Arc<StateStore>) -> Reconciler {
        Reconciler::new(
            store.clone(),
            ReconcilerConfig {
                namespace: "fleet".to_string(),
                ..Default::default()
            },
        )
    }

    #[test]
    fn parse_machine_ref_forms() {
        assert_eq!(parse_machine_ref("fleet/m1"), Some(("fleet", "m1")));
        assert_eq!(parse_machine_ref("m1"), Some(("", "m1")));
        assert_eq!(parse_machine_ref("/m1"), Some(("", "m1")));
        assert_eq!(parse_machine_ref("fleet/"), None);
        assert_eq!(parse_machine_ref(""), None);
        assert_eq!(parse_machine_ref("a/b/c"), None);
    }

    #[test]
    fn missing_node_is_done() {
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        let result = reconciler(&store).reconcile_at("ghost", now()).unwrap();
        assert_eq!(result, Reconciled::done(Outcome::NodeNotFound));
    }

    #[test]
    fn unannotated_node_is_done() {
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        store
            .put_node(&Node {
                name: "n1".to_string(),
                ..Default::default()
            })
            .unwrap();
        let result = reconciler(&store).reconcile_at("n1", now()).unwrap();
        assert_eq!(result.outcome, Outcome::NoMachineReference);
    }

    #[test]
    fn malformed_reference_is_an_error() {
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        store
            .put_node(&Node {
                name: "n1".to_string(),
                annotations: [(MACHINE_ANNOTATION.to_string(), "a/b/c".to_string())].into(),
                ..Default::default()
            })
            .unwrap();
        let reconciler = reconciler(&store);
        let err = reconciler.reconcile_at("n1", now()).unwrap_err();
        assert!(matches!(err, ReconcileError::MalformedReference { .. }));
        assert_eq!(reconciler.metrics().get(Counter::Errors), 1);
    }

    #[test]
    fn bare_machine_name_resolves_to_empty_namespace() {
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        store
            .put_node(&Node {
                name: "n1".to_string(),
                annotations: [(MACHINE_ANNOTATION.to_string(), "m1".to_string())].into(),
                ..Default::default()
            })
            .unwrap();
        let result = reconciler(&store).reconcile_at("n1", now()).unwrap();
        assert_eq!(
            result.outcome,
            Outcome::MachineNotFound {
                machine: "m1".to_string()
            }
        );
    }

    #[test]
    fn unmatched_machine_is_done() {
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        seed(&store, "n1", 600);
        let result = reconciler(&store).reconcile_at("n1", now()).unwrap();
        assert!(matches!(result.outcome, Outcome::NoMatchingHealthCheck { .. }));
        assert!(store.get_machine("fleet", "m-n1").unwrap().is_some());
    }

    #[test]
    fn terminating_policy_is_ignored() {
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        seed(&store, "n1", 600);
        let mut policy = MachineHealthCheck {
            namespace: "fleet".to_string(),
            name: "workers".to_string(),
            selector: LabelSelector {
                match_labels: worker_labels(),
                ..Default::default()
            },
            ..Default::default()
        };
        policy.deletion_timestamp = Some(now());
        store.put_health_check(&policy).unwrap();

        let reconciler = reconciler(&store);
        let result = reconciler.reconcile_at("n1", now()).unwrap();
        assert!(matches!(result.outcome, Outcome::NoMatchingHealthCheck { .. }));
        assert!(reconciler.map_policy_change("fleet", "workers").is_empty());
    }

    #[test]
    fn pending_node_requeues_with_min_wait() {
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        seed(&store, "n1", 15);
        put_policy(&store, "workers");

        let reconciler = reconciler(&store);
        let result = reconciler.reconcile_at("n1", now()).unwrap();
        assert_eq!(result.requeue_after, Some(Duration::from_secs(46)));
        assert_eq!(reconciler.metrics().get(Counter::Pending), 1);
    }

    fn put_malformed_conditions(store: &StateStore) {
        let mut config = ConfigResource {
            namespace: "fleet".to_string(),
            name: "node-unhealthy-conditions".to_string(),
            ..Default::default()
        };
        config
            .data
            .insert("conditions".to_string(), "items: [".to_string());
        store.put_config(&config).unwrap();
    }

    #[test]
    fn malformed_conditions_degrade_to_defaults() {
        assert!(ReconcilerConfig::default().fallback_on_malformed_conditions);

        let store = Arc::new(StateStore::open_in_memory().unwrap());
        seed(&store, "n1", 600);
        put_policy(&store, "workers");
        put_malformed_conditions(&store);

        let result = reconciler(&store).reconcile_at("n1", now()).unwrap();
        assert!(matches!(
            result.outcome,
            Outcome::Remediated(RemediationOutcome::MachineDeleted { .. })
        ));
        assert!(store.get_machine("fleet", "m-n1").unwrap().is_none());
    }

    #[test]
    fn malformed_conditions_fail_when_fallback_disabled() {
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        seed(&store, "n1", 600);
        put_policy(&store, "workers");
        put_malformed_conditions(&store);

        let strict = Reconciler::new(
            store.clone(),
            ReconcilerConfig {
                namespace: "fleet".to_string(),
                fallback_on_malformed_conditions: false,
                ..Default::default()
            },
        );
        let err = strict.reconcile_at("n1", now()).unwrap_err();
        assert!(matches!(err, ReconcileError::Conditions(_)));
        assert!(store.get_machine("fleet", "m-n1").unwrap().is_some());
    }

    #[test]
    fn first_policy_by_name_decides_strategy() {
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        seed(&store, "n1", 600);
        let policy = |name: &str, strategy| MachineHealthCheck {
            namespace: "fleet".to_string(),
            name: name.to_string(),
            selector: LabelSelector {
                match_labels: worker_labels(),
                ..Default::default()
            },
            remediation_strategy: Some(strategy),
            ..Default::default()
        };
        store
            .put_health_check(&policy("b-delete", RemediationStrategy::Delete))
            .unwrap();
        store
            .put_health_check(&policy("a-reboot", RemediationStrategy::Reboot))
            .unwrap();

        let result = reconciler(&store).reconcile_at("n1", now()).unwrap();
        assert!(matches!(
            result.outcome,
            Outcome::Remediated(RemediationOutcome::RebootRequested { .. })
        ));
        assert!(store.get_machine("fleet", "m-n1").unwrap().is_some());
    }

    #[test]
    fn map_policy_change_fans_out_to_matched_nodes() {
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        seed(&store, "n1", 0);
        seed(&store, "n2", 0);
        put_policy(&store, "workers");

        let reconciler = reconciler(&store);
        let nodes = reconciler.map_policy_change("fleet", "workers");
        assert_eq!(
            nodes.into_iter().collect::<Vec<_>>(),
            vec!["n1".to_string(), "n2".to_string()]
        );
        assert!(reconciler.map_policy_change("fleet", "missing").is_empty());
    }

    #[test]
    fn evaluate_node_reports_without_remediating() {
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        seed(&store, "n1", 600);
        put_policy(&store, "workers");

        let report = reconciler(&store)
            .evaluate_node("n1", now())
            .unwrap()
            .unwrap();
        assert_eq!(report.status, ReportStatus::Actionable);
        assert_eq!(report.health_check.as_deref(), Some("fleet/workers"));
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].elapsed_secs, 600);
        assert!(store.get_machine("fleet", "m-n1").unwrap().is_some());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "actionable");
        assert_eq!(json["strategy"], "delete");
    }

    #[test]
    fn evaluate_unknown_node_is_none() {
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        assert!(reconciler(&store).evaluate_node("ghost", now()).unwrap().is_none());
    }
}
