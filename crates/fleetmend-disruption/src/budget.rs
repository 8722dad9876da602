//! Budget coordinator: optimistic decrement of per-group disruption budgets.
//!
//! Each attempt reads the budget, checks `disruptions_allowed > 0`, and writes
//! the decremented value back carrying the version it read. A stale version
//! means another reconcile won the race; the coordinator re-reads and tries
//! again, up to `max_attempts` times.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use fleetmend_state::{DisruptionBudget, FleetClient, GroupRef, StateError};

/// Attempts made before a contended budget is reported as a conflict.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Result type alias for budget operations.
pub type BudgetResult<T> = Result<T, BudgetError>;

#[derive(Debug, Error)]
pub enum BudgetError {
    /// No disruptions left for the group. Nothing was written.
    #[error("disruption budget for {group} is exhausted")]
    Exceeded { group: GroupRef },

    /// Every attempt lost a write race.
    #[error("disruption budget for {group} still conflicting after {attempts} attempts")]
    Conflict { group: GroupRef, attempts: u32 },

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

impl BudgetError {
    pub fn is_exceeded(&self) -> bool {
        matches!(self, BudgetError::Exceeded { .. })
    }
}

/// A successful budget consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consumed {
    /// One disruption taken; `remaining` are left.
    Decremented { remaining: u32 },
    /// The group has no budget object, so nothing limits it.
    Unbounded,
}

pub struct BudgetCoordinator {
    client: Arc<dyn FleetClient>,
    max_attempts: u32,
}

impl BudgetCoordinator {
    pub fn new(client: Arc<dyn FleetClient>) -> Self {
        Self::with_max_attempts(client, DEFAULT_MAX_ATTEMPTS)
    }

    /// `max_attempts` is clamped to at least one.
    pub fn with_max_attempts(client: Arc<dyn FleetClient>, max_attempts: u32) -> Self {
        Self {
            client,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Take one disruption from the group's budget.
    pub fn try_consume(&self, group: &GroupRef) -> BudgetResult<Consumed> {
        for attempt in 1..=self.max_attempts {
            let Some(budget) = self.client.get_budget(&group.namespace, &group.name)? else {
                debug!(%group, "no disruption budget configured");
                return Ok(Consumed::Unbounded);
            };

            if budget.disruptions_allowed == 0 {
                info!(%group, "disruption budget exhausted");
                return Err(BudgetError::Exceeded {
                    group: group.clone(),
                });
            }

            let next = DisruptionBudget {
                disruptions_allowed: budget.disruptions_allowed - 1,
                ..budget
            };
            match self.client.update_budget(&next) {
                Ok(written) => {
                    debug!(
                        %group,
                        remaining = written.disruptions_allowed,
                        attempt,
                        "disruption budget consumed"
                    );
                    return Ok(Consumed::Decremented {
                        remaining: written.disruptions_allowed,
                    });
                }
                // Deleted between read and write: the next read settles it.
                Err(e) if e.is_conflict() || e.is_not_found() => {
                    debug!(%group, attempt, error = %e, "budget write raced, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(%group, attempts = self.max_attempts, "gave up on contended disruption budget");
        Err(BudgetError::Conflict {
            group: group.clone(),
            attempts: self.max_attempts,
        })
    }

    /// Return one disruption to the group's budget.
    ///
    /// Used when a remediation fails after its budget was consumed. A group
    /// without a budget object is left alone.
    pub fn release(&self, group: &GroupRef) -> BudgetResult<()> {
        for attempt in 1..=self.max_attempts {
            let Some(budget) = self.client.get_budget(&group.namespace, &group.name)? else {
                return Ok(());
            };

            let next = DisruptionBudget {
                disruptions_allowed: budget.disruptions_allowed.saturating_add(1),
                ..budget
            };
            match self.client.update_budget(&next) {
                Ok(written) => {
                    info!(
                        %group,
                        remaining = written.disruptions_allowed,
                        "disruption budget released"
                    );
                    return Ok(());
                }
                Err(e) if e.is_conflict() || e.is_not_found() => {
                    debug!(%group, attempt, error = %e, "budget release raced, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(BudgetError::Conflict {
            group: group.clone(),
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetmend_state::{
        ConfigResource, Machine, MachineHealthCheck, Node, StateResult, StateStore,
    };
    use std::sync::atomic::{AtomicU32, Ordering};

    fn group() -> GroupRef {
        GroupRef {
            namespace: "fleet".to_string(),
            name: "workers".to_string(),
        }
    }

    fn store_with_budget(allowed: Option<u32>) -> Arc<StateStore> {
        let store = StateStore::open_in_memory().unwrap();
        if let Some(allowed) = allowed {
            store
                .put_budget(&DisruptionBudget {
                    namespace: "fleet".to_string(),
                    group: "workers".to_string(),
                    disruptions_allowed: allowed,
                    resource_version: 0,
                })
                .unwrap();
        }
        Arc::new(store)
    }

    fn allowed(store: &StateStore) -> u32 {
        store
            .get_budget("fleet", "workers")
            .unwrap()
            .unwrap()
            .disruptions_allowed
    }

    /// Fails the first `conflicts` budget writes with a version conflict.
    struct Contended {
        inner: Arc<StateStore>,
        conflicts: AtomicU32,
    }

    impl FleetClient for Contended {
        fn get_node(&self, name: &str) -> StateResult<Option<Node>> {
            self.inner.get_node(name)
        }
        fn update_node(&self, node: &Node) -> StateResult<Node> {
            self.inner.update_node(node)
        }
        fn list_nodes(&self) -> StateResult<Vec<Node>> {
            self.inner.list_nodes()
        }
        fn get_machine(&self, namespace: &str, name: &str) -> StateResult<Option<Machine>> {
            self.inner.get_machine(namespace, name)
        }
        fn list_machines(&self, namespace: &str) -> StateResult<Vec<Machine>> {
            self.inner.list_machines(namespace)
        }
        fn delete_machine(&self, namespace: &str, name: &str) -> StateResult<bool> {
            self.inner.delete_machine(namespace, name)
        }
        fn get_health_check(
            &self,
            namespace: &str,
            name: &str,
        ) -> StateResult<Option<MachineHealthCheck>> {
            self.inner.get_health_check(namespace, name)
        }
        fn list_health_checks(&self, namespace: &str) -> StateResult<Vec<MachineHealthCheck>> {
            self.inner.list_health_checks(namespace)
        }
        fn get_budget(
            &self,
            namespace: &str,
            group: &str,
        ) -> StateResult<Option<DisruptionBudget>> {
            self.inner.get_budget(namespace, group)
        }
        fn update_budget(&self, budget: &DisruptionBudget) -> StateResult<DisruptionBudget> {
            let left = self.conflicts.load(Ordering::SeqCst);
            if left > 0 {
                self.conflicts.store(left - 1, Ordering::SeqCst);
                return Err(StateError::Conflict {
                    key: budget.table_key(),
                    expected: budget.resource_version,
                    found: budget.resource_version + 1,
                });
            }
            self.inner.update_budget(budget)
        }
        fn get_config(&self, namespace: &str, name: &str) -> StateResult<Option<ConfigResource>> {
            self.inner.get_config(namespace, name)
        }
    }

    #[test]
    fn consume_decrements() {
        let store = store_with_budget(Some(2));
        let coordinator = BudgetCoordinator::new(store.clone());

        assert_eq!(
            coordinator.try_consume(&group()).unwrap(),
            Consumed::Decremented { remaining: 1 }
        );
        assert_eq!(allowed(&store), 1);
    }

    #[test]
    fn exhausted_budget_is_left_untouched() {
        let store = store_with_budget(Some(0));
        let version = store.get_budget("fleet", "workers").unwrap().unwrap().resource_version;
        let coordinator = BudgetCoordinator::new(store.clone());

        let err = coordinator.try_consume(&group()).unwrap_err();
        assert!(err.is_exceeded());

        let budget = store.get_budget("fleet", "workers").unwrap().unwrap();
        assert_eq!(budget.disruptions_allowed, 0);
        assert_eq!(budget.resource_version, version);
    }

    #[test]
    fn missing_budget_is_unbounded() {
        let coordinator = BudgetCoordinator::new(store_with_budget(None));
        assert_eq!(coordinator.try_consume(&group()).unwrap(), Consumed::Unbounded);
    }

    #[test]
    fn conflicts_are_retried() {
        let store = store_with_budget(Some(1));
        let client = Arc::new(Contended {
            inner: store.clone(),
            conflicts: AtomicU32::new(2),
        });
        let coordinator = BudgetCoordinator::new(client);

        assert_eq!(
            coordinator.try_consume(&group()).unwrap(),
            Consumed::Decremented { remaining: 0 }
        );
        assert_eq!(allowed(&store), 0);
    }

    #[test]
    fn persistent_conflicts_surface_after_max_attempts() {
        let store = store_with_budget(Some(1));
        let client = Arc::new(Contended {
            inner: store.clone(),
            conflicts: AtomicU32::new(u32::MAX),
        });
        let coordinator = BudgetCoordinator::with_max_attempts(client, 3);

        match coordinator.try_consume(&group()) {
            Err(BudgetError::Conflict { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(allowed(&store), 1);
    }

    #[test]
    fn zero_max_attempts_still_tries_once() {
        let store = store_with_budget(Some(1));
        let coordinator = BudgetCoordinator::with_max_attempts(store.clone(), 0);
        assert_eq!(coordinator.max_attempts(), 1);
        assert!(coordinator.try_consume(&group()).is_ok());
    }

    #[test]
    fn release_returns_a_unit() {
        let store = store_with_budget(Some(1));
        let coordinator = BudgetCoordinator::new(store.clone());

        coordinator.try_consume(&group()).unwrap();
        assert_eq!(allowed(&store), 0);
        coordinator.release(&group()).unwrap();
        assert_eq!(allowed(&store), 1);
    }

    #[test]
    fn release_without_budget_is_noop() {
        let coordinator = BudgetCoordinator::new(store_with_budget(None));
        coordinator.release(&group()).unwrap();
    }

    #[test]
    fn concurrent_consumers_never_overdraw() {
        let store = store_with_budget(Some(3));
        let coordinator = Arc::new(BudgetCoordinator::new(store.clone()));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let coordinator = coordinator.clone();
                std::thread::spawn(move || coordinator.try_consume(&group()))
            })
            .collect();

        let mut granted = 0;
        for handle in handles {
            match handle.join().unwrap() {
                Ok(Consumed::Decremented { .. }) => granted += 1,
                Ok(Consumed::Unbounded) => panic!("budget exists"),
                Err(e) => assert!(e.is_exceeded(), "unexpected error: {e}"),
            }
        }

        assert_eq!(granted, 3);
        assert_eq!(allowed(&store), 0);
    }
}
