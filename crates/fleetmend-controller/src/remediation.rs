//! Remediation engine: drives the remediation state machine for one
//! actionable-unhealthy machine.
//!
//! ```text
//! Start ──► BudgetCheck ──► Reboot ──► Done
//!   │            │     └──► Delete ──► Done
//!   │            └─(exhausted)───────► Done (deferred)
//!   ├─(control plane, delete)─► Skip ─► Done
//!   └─(unowned / already rebooting)───► Done
//! ```
//!
//! The no-op guards in `Start` run before the budget is touched, so
//! reconciling an already-remediated node again consumes nothing.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use fleetmend_disruption::{BudgetCoordinator, BudgetError, Consumed};
use fleetmend_state::{
    FleetClient, GroupRef, Machine, Node, REBOOT_ANNOTATION, RemediationStrategy,
};

use crate::error::ReconcileResult;

/// Current phase of a remediation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemediationPhase {
    Start,
    /// Taking one disruption from the machine's group.
    BudgetCheck { group: GroupRef },
    /// Writing the reboot-request annotation onto the node.
    Reboot { group: GroupRef },
    /// Deleting the machine so its group replaces it.
    Delete { group: GroupRef },
    /// Exempt from delete-based remediation.
    Skip,
    Done(RemediationOutcome),
}

/// What a finished remediation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemediationOutcome {
    /// Machine has no `MachineSet` owner; nothing replaces it.
    NotOwned,
    /// Budget exhausted; check again after `retry_after`.
    BudgetDeferred {
        group: GroupRef,
        retry_after: Duration,
    },
    /// Control-plane node under a delete strategy.
    SkippedControlPlane,
    RebootRequested {
        group: GroupRef,
    },
    /// The reboot annotation was already on the node.
    RebootAlreadyPending,
    MachineDeleted {
        group: GroupRef,
    },
    /// The node or machine disappeared before the write landed.
    AlreadyGone,
}

/// One remediation in progress.
#[derive(Debug, Clone)]
pub struct Remediation {
    pub node: Node,
    pub machine: Machine,
    pub strategy: RemediationStrategy,
    pub phase: RemediationPhase,
    /// Set once budget is taken; cleared when the write lands.
    holds_budget: bool,
}

impl Remediation {
    pub fn new(node: Node, machine: Machine, strategy: RemediationStrategy) -> Self {
        Self {
            node,
            machine,
            strategy,
            phase: RemediationPhase::Start,
            holds_budget: false,
        }
    }

    pub fn outcome(&self) -> Option<&RemediationOutcome> {
        match &self.phase {
            RemediationPhase::Done(outcome) => Some(outcome),
            _ => None,
        }
    }

    fn machine_key(&self) -> String {
        self.machine.table_key()
    }
}

/// Executes remediations against the fleet.
pub struct RemediationEngine {
    client: Arc<dyn FleetClient>,
    budget: BudgetCoordinator,
    cooldown: Duration,
}

impl RemediationEngine {
    /// `cooldown` is how long a budget-deferred remediation waits before
    /// the node is checked again.
    pub fn new(
        client: Arc<dyn FleetClient>,
        budget: BudgetCoordinator,
        cooldown: Duration,
    ) -> Self {
        Self {
            client,
            budget,
            cooldown,
        }
    }

    /// Run a remediation from `Start` to `Done`.
    pub fn remediate(
        &self,
        node: Node,
        machine: Machine,
        strategy: RemediationStrategy,
    ) -> ReconcileResult<RemediationOutcome> {
        let mut remediation = Remediation::new(node, machine, strategy);
        loop {
            if let Some(outcome) = remediation.outcome() {
                return Ok(outcome.clone());
            }
            self.advance(&mut remediation)?;
        }
    }

    /// Advance the remediation by one phase.
    ///
    /// On error the remediation stays in its current phase. Budget taken
    /// before a failed write is returned first.
    pub fn advance(&self, r: &mut Remediation) -> ReconcileResult<()> {
        let next = match r.phase.clone() {
            RemediationPhase::Done(_) => return Ok(()),
            RemediationPhase::Start => self.start(r),
            RemediationPhase::BudgetCheck { group } => self.budget_check(r, group)?,
            RemediationPhase::Reboot { group } => {
                let result = self.reboot(r, &group);
                self.settle(r, &group, result)?
            }
            RemediationPhase::Delete { group } => {
                let result = self.delete(r, &group);
                self.settle(r, &group, result)?
            }
            RemediationPhase::Skip => {
                info!(
                    node = %r.node.name,
                    machine = %r.machine_key(),
                    "control-plane node, skipping deletion"
                );
                RemediationPhase::Done(RemediationOutcome::SkippedControlPlane)
            }
        };
        debug!(machine = %r.machine_key(), phase = ?next, "remediation advanced");
        r.phase = next;
        Ok(())
    }

    fn start(&self, r: &Remediation) -> RemediationPhase {
        let Some(group) = r.machine.owning_group() else {
            info!(
                machine = %r.machine_key(),
                "machine has no MachineSet owner, skipping remediation"
            );
            return RemediationPhase::Done(RemediationOutcome::NotOwned);
        };

        match r.strategy {
            RemediationStrategy::Reboot if r.node.reboot_requested() => {
                debug!(node = %r.node.name, "reboot already requested");
                RemediationPhase::Done(RemediationOutcome::RebootAlreadyPending)
            }
            RemediationStrategy::Delete if r.node.is_control_plane() => RemediationPhase::Skip,
            _ => RemediationPhase::BudgetCheck { group },
        }
    }

    fn budget_check(
        &self,
        r: &mut Remediation,
        group: GroupRef,
    ) -> ReconcileResult<RemediationPhase> {
        match self.budget.try_consume(&group) {
            Ok(consumed) => {
                r.holds_budget = matches!(consumed, Consumed::Decremented { .. });
                Ok(match r.strategy {
                    RemediationStrategy::Reboot => RemediationPhase::Reboot { group },
                    RemediationStrategy::Delete => RemediationPhase::Delete { group },
                })
            }
            Err(BudgetError::Exceeded { group }) => {
                warn!(
                    machine = %r.machine_key(),
                    %group,
                    retry_after = ?self.cooldown,
                    "disruption budget exhausted, deferring remediation"
                );
                Ok(RemediationPhase::Done(RemediationOutcome::BudgetDeferred {
                    group,
                    retry_after: self.cooldown,
                }))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn reboot(&self, r: &Remediation, group: &GroupRef) -> ReconcileResult<RemediationOutcome> {
        let mut node = r.node.clone();
        node.annotations
            .insert(REBOOT_ANNOTATION.to_string(), String::new());

        info!(
            node = %node.name,
            machine = %r.machine_key(),
            "machine unhealthy for too long, requesting reboot"
        );
        match self.client.update_node(&node) {
            Ok(_) => Ok(RemediationOutcome::RebootRequested {
                group: group.clone(),
            }),
            Err(e) if e.is_not_found() => Ok(RemediationOutcome::AlreadyGone),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, r: &Remediation, group: &GroupRef) -> ReconcileResult<RemediationOutcome> {
        info!(
            node = %r.node.name,
            machine = %r.machine_key(),
            "machine unhealthy for too long, deleting"
        );
        let existed = self
            .client
            .delete_machine(&r.machine.namespace, &r.machine.name)?;
        Ok(if existed {
            RemediationOutcome::MachineDeleted {
                group: group.clone(),
            }
        } else {
            RemediationOutcome::AlreadyGone
        })
    }

    /// Finish a remediation write, returning held budget unless something
    /// was actually disrupted.
    fn settle(
        &self,
        r: &mut Remediation,
        group: &GroupRef,
        result: ReconcileResult<RemediationOutcome>,
    ) -> ReconcileResult<RemediationPhase> {
        let disrupted = matches!(
            result,
            Ok(RemediationOutcome::RebootRequested { .. }
                | RemediationOutcome::MachineDeleted { .. })
        );
        if r.holds_budget && !disrupted {
            if let Err(e) = &result {
                error!(machine = %r.machine_key(), error = %e, "remediation write failed");
            }
            if let Err(e) = self.budget.release(group) {
                error!(%group, error = %e, "failed to return disruption budget");
            }
        }
        r.holds_budget = false;
        result.map(RemediationPhase::Done)
    }
}
