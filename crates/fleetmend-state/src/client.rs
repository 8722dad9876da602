//! The collaborator interface the remediation controller consumes.
//!
//! Every read and write the controller performs goes through [`FleetClient`].
//! `StateStore` is the production implementation; tests wrap it to inject
//! conflicts or failures.
//!
//! Lookups return `Ok(None)` for missing objects. `update_*` writes carry the
//! caller's `resource_version` and fail with [`StateError::Conflict`] when it
//! is stale, or [`StateError::NotFound`] when the object is gone.
//!
//! [`StateError::Conflict`]: crate::StateError::Conflict
//! [`StateError::NotFound`]: crate::StateError::NotFound

use crate::error::StateResult;
use crate::store::StateStore;
use crate::types::*;

/// Get/update/list/delete access to fleet objects.
pub trait FleetClient: Send + Sync {
    fn get_node(&self, name: &str) -> StateResult<Option<Node>>;

    fn update_node(&self, node: &Node) -> StateResult<Node>;

    /// Every node, used by the periodic resync.
    fn list_nodes(&self) -> StateResult<Vec<Node>>;

    fn get_machine(&self, namespace: &str, name: &str) -> StateResult<Option<Machine>>;

    fn list_machines(&self, namespace: &str) -> StateResult<Vec<Machine>>;

    /// Returns false if the machine was already gone.
    fn delete_machine(&self, namespace: &str, name: &str) -> StateResult<bool>;

    fn get_health_check(&self, namespace: &str, name: &str)
    -> StateResult<Option<MachineHealthCheck>>;

    fn list_health_checks(&self, namespace: &str) -> StateResult<Vec<MachineHealthCheck>>;

    fn get_budget(&self, namespace: &str, group: &str) -> StateResult<Option<DisruptionBudget>>;

    fn update_budget(&self, budget: &DisruptionBudget) -> StateResult<DisruptionBudget>;

    fn get_config(&self, namespace: &str, name: &str) -> StateResult<Option<ConfigResource>>;
}

impl FleetClient for StateStore {
    fn get_node(&self, name: &str) -> StateResult<Option<Node>> {
        StateStore::get_node(self, name)
    }

    fn update_node(&self, node: &Node) -> StateResult<Node> {
        StateStore::update_node(self, node)
    }

    fn list_nodes(&self) -> StateResult<Vec<Node>> {
        StateStore::list_nodes(self)
    }

    fn get_machine(&self, namespace: &str, name: &str) -> StateResult<Option<Machine>> {
        StateStore::get_machine(self, namespace, name)
    }

    fn list_machines(&self, namespace: &str) -> StateResult<Vec<Machine>> {
        StateStore::list_machines(self, namespace)
    }

    fn delete_machine(&self, namespace: &str, name: &str) -> StateResult<bool> {
        StateStore::delete_machine(self, namespace, name)
    }

    fn get_health_check(
        &self,
        namespace: &str,
        name: &str,
    ) -> StateResult<Option<MachineHealthCheck>> {
        StateStore::get_health_check(self, namespace, name)
    }

    fn list_health_checks(&self, namespace: &str) -> StateResult<Vec<MachineHealthCheck>> {
        StateStore::list_health_checks(self, namespace)
    }

    fn get_budget(&self, namespace: &str, group: &str) -> StateResult<Option<DisruptionBudget>> {
        StateStore::get_budget(self, namespace, group)
    }

    fn update_budget(&self, budget: &DisruptionBudget) -> StateResult<DisruptionBudget> {
        StateStore::update_budget(self, budget)
    }

    fn get_config(&self, namespace: &str, name: &str) -> StateResult<Option<ConfigResource>> {
        StateStore::get_config(self, namespace, name)
    }
}
