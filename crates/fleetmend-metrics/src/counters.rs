//! Remediation counters.
//!
//! Outcome counters are plain atomics. Per-group remediation counts sit
//! behind a mutex since groups appear dynamically.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::debug;

/// Reconcile outcome counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    /// Every reconcile run, whatever its outcome.
    Reconciles,
    Healthy,
    /// Unhealthy but not yet past its timeout.
    Pending,
    MachineDeletions,
    RebootRequests,
    BudgetDeferrals,
    ControlPlaneSkips,
    /// Machine has no owning group.
    UnownedSkips,
    Errors,
}

impl Counter {
    pub const ALL: [Counter; 9] = [
        Counter::Reconciles,
        Counter::Healthy,
        Counter::Pending,
        Counter::MachineDeletions,
        Counter::RebootRequests,
        Counter::BudgetDeferrals,
        Counter::ControlPlaneSkips,
        Counter::UnownedSkips,
        Counter::Errors,
    ];

    fn index(self) -> usize {
        self as usize
    }

    /// Prometheus metric name.
    pub fn metric_name(self) -> &'static str {
        match self {
            Counter::Reconciles => "fleetmend_reconciles_total",
            Counter::Healthy => "fleetmend_healthy_total",
            Counter::Pending => "fleetmend_pending_total",
            Counter::MachineDeletions => "fleetmend_machine_deletions_total",
            Counter::RebootRequests => "fleetmend_reboot_requests_total",
            Counter::BudgetDeferrals => "fleetmend_budget_deferrals_total",
            Counter::ControlPlaneSkips => "fleetmend_control_plane_skips_total",
            Counter::UnownedSkips => "fleetmend_unowned_skips_total",
            Counter::Errors => "fleetmend_reconcile_errors_total",
        }
    }

    pub fn help(self) -> &'static str {
        match self {
            Counter::Reconciles => "Reconcile runs.",
            Counter::Healthy => "Reconciles that found the node healthy.",
            Counter::Pending => "Reconciles that scheduled a re-check of an unhealthy node.",
            Counter::MachineDeletions => "Machines deleted for remediation.",
            Counter::RebootRequests => "Reboot annotations written for remediation.",
            Counter::BudgetDeferrals => "Remediations deferred by an exhausted disruption budget.",
            Counter::ControlPlaneSkips => "Deletions skipped on control-plane nodes.",
            Counter::UnownedSkips => "Remediations skipped for machines without an owning group.",
            Counter::Errors => "Reconciles that failed and were re-queued.",
        }
    }
}

/// Kind of remediation recorded against a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationAction {
    Delete,
    Reboot,
}

impl RemediationAction {
    pub fn as_str(self) -> &'static str {
        match self {
            RemediationAction::Delete => "delete",
            RemediationAction::Reboot => "reboot",
        }
    }
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub reconciles: u64,
    pub healthy: u64,
    pub pending: u64,
    pub machine_deletions: u64,
    pub reboot_requests: u64,
    pub budget_deferrals: u64,
    pub control_plane_skips: u64,
    pub unowned_skips: u64,
    pub errors: u64,
    /// Remediations keyed by (group, action).
    #[serde(skip)]
    pub remediations: BTreeMap<(String, RemediationAction), u64>,
}

impl MetricsSnapshot {
    pub fn get(&self, counter: Counter) -> u64 {
        match counter {
            Counter::Reconciles => self.reconciles,
            Counter::Healthy => self.healthy,
            Counter::Pending => self.pending,
            Counter::MachineDeletions => self.machine_deletions,
            Counter::RebootRequests => self.reboot_requests,
            Counter::BudgetDeferrals => self.budget_deferrals,
            Counter::ControlPlaneSkips => self.control_plane_skips,
            Counter::UnownedSkips => self.unowned_skips,
            Counter::Errors => self.errors,
        }
    }
}

/// Shared counters, updated by reconcilers and read by the API.
#[derive(Debug, Default)]
pub struct RemediationMetrics {
    counters: [AtomicU64; Counter::ALL.len()],
    remediations: Mutex<BTreeMap<(String, RemediationAction), u64>>,
}

impl RemediationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, counter: Counter) {
        self.counters[counter.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Count a remediation against `group` (`namespace/name`).
    pub fn record_remediation(&self, group: &str, action: RemediationAction) {
        let counter = match action {
            RemediationAction::Delete => Counter::MachineDeletions,
            RemediationAction::Reboot => Counter::RebootRequests,
        };
        self.record(counter);

        // A poisoned lock only loses the per-group breakdown.
        if let Ok(mut per_group) = self.remediations.lock() {
            *per_group.entry((group.to_string(), action)).or_insert(0) += 1;
        }
        debug!(%group, action = action.as_str(), "remediation recorded");
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.counters[counter.index()].load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let remediations = self
            .remediations
            .lock()
            .map(|per_group| per_group.clone())
            .unwrap_or_default();
        MetricsSnapshot {
            reconciles: self.get(Counter::Reconciles),
            healthy: self.get(Counter::Healthy),
            pending: self.get(Counter::Pending),
            machine_deletions: self.get(Counter::MachineDeletions),
            reboot_requests: self.get(Counter::RebootRequests),
            budget_deferrals: self.get(Counter::BudgetDeferrals),
            control_plane_skips: self.get(Counter::ControlPlaneSkips),
            unowned_skips: self.get(Counter::UnownedSkips),
            errors: self.get(Counter::Errors),
            remediations,
        }
    }
}
