//! redb table definitions for the fleetmend state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).
//! Namespaced objects are keyed `{namespace}/{name}`; nodes by name.

use redb::TableDefinition;

/// Nodes keyed by `{name}`.
pub const NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("nodes");

/// Machines keyed by `{namespace}/{name}`.
pub const MACHINES: TableDefinition<&str, &[u8]> = TableDefinition::new("machines");

/// Machine health checks keyed by `{namespace}/{name}`.
pub const HEALTH_CHECKS: TableDefinition<&str, &[u8]> = TableDefinition::new("health_checks");

/// Disruption budgets keyed by `{namespace}/{group}`.
pub const BUDGETS: TableDefinition<&str, &[u8]> = TableDefinition::new("budgets");

/// Config resources keyed by `{namespace}/{name}`.
pub const CONFIGS: TableDefinition<&str, &[u8]> = TableDefinition::new("configs");
