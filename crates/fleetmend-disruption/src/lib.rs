//! fleetmend-disruption: bounding how many machines in a group are
//! remediated at once.
//!
//! A group's [`DisruptionBudget`](fleetmend_state::DisruptionBudget) is the
//! only shared mutable resource in the remediation path. It is mutated solely
//! through [`BudgetCoordinator`], which decrements it with a version-checked
//! write and retries on conflicts, so concurrent reconciles of machines in
//! the same group can never take it below zero.

pub mod budget;

pub use budget::{BudgetCoordinator, BudgetError, BudgetResult, Consumed, DEFAULT_MAX_ATTEMPTS};
