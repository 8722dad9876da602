//! StateStore: redb-backed state persistence for fleetmend.
//!
//! Provides typed CRUD operations over nodes, machines, health checks,
//! disruption budgets and config resources. All values are JSON-serialized
//! into redb's `&[u8]` value columns. The store supports both on-disk and
//! in-memory backends (the latter for testing).
//!
//! Writes come in two flavours:
//! - `put_*` upserts unconditionally and bumps the resource version. This is
//!   what the provisioning side (API, tests) uses to register objects.
//! - `update_*` is a compare-and-swap on `resource_version`, performed
//!   inside a single write transaction. A stale caller gets
//!   [`StateError::Conflict`] and must re-read.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

type RecordTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// A stored object with a key and an optimistic-concurrency version.
trait Record: Serialize + DeserializeOwned + Clone {
    fn key(&self) -> String;
    fn version(&self) -> u64;
    fn set_version(&mut self, version: u64);
}

macro_rules! impl_record {
    ($ty:ty, |$this:ident| $key:expr) => {
        impl Record for $ty {
            fn key(&self) -> String {
                let $this = self;
                $key
            }
            fn version(&self) -> u64 {
                self.resource_version
            }
            fn set_version(&mut self, version: u64) {
                self.resource_version = version;
            }
        }
    };
}

impl_record!(Node, |n| n.name.clone());
impl_record!(Machine, |m| m.table_key());
impl_record!(MachineHealthCheck, |h| h.table_key());
impl_record!(DisruptionBudget, |b| b.table_key());
impl_record!(ConfigResource, |c| c.table_key());

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        for table in [NODES, MACHINES, HEALTH_CHECKS, BUDGETS, CONFIGS] {
            txn.open_table(table).map_err(map_err!(Table))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Generic record access ──────────────────────────────────────

    fn get_record<T: Record>(&self, table: RecordTable, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: T =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// List records whose key starts with `prefix` (all records for `""`).
    fn list_records<T: Record>(&self, table: RecordTable, prefix: &str) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(prefix) {
                let record: T =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(record);
            }
        }
        Ok(results)
    }

    /// Upsert a record, bumping its version past whatever is stored.
    fn put_record<T: Record>(&self, table: RecordTable, record: &T) -> StateResult<T> {
        let key = record.key();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let stored;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            let current = read_version(&table, &key)?;
            let mut next = record.clone();
            next.set_version(current.unwrap_or(0) + 1);
            let value = serde_json::to_vec(&next).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
            stored = next;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, version = stored.version(), "record stored");
        Ok(stored)
    }

    /// Compare-and-swap write: succeeds only if the stored version matches.
    fn update_record<T: Record>(&self, table: RecordTable, record: &T) -> StateResult<T> {
        let key = record.key();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let stored;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            let found = read_version(&table, &key)?
                .ok_or_else(|| StateError::NotFound(key.clone()))?;
            if found != record.version() {
                return Err(StateError::Conflict {
                    key,
                    expected: record.version(),
                    found,
                });
            }
            let mut next = record.clone();
            next.set_version(found + 1);
            let value = serde_json::to_vec(&next).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
            stored = next;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, version = stored.version(), "record updated");
        Ok(stored)
    }

    fn delete_record(&self, table: RecordTable, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "record deleted");
        Ok(existed)
    }

    // ── Nodes ──────────────────────────────────────────────────────

    /// Insert or replace a node.
    pub fn put_node(&self, node: &Node) -> StateResult<Node> {
        self.put_record(NODES, node)
    }

    /// Get a node by name.
    pub fn get_node(&self, name: &str) -> StateResult<Option<Node>> {
        self.get_record(NODES, name)
    }

    /// Write a node back, failing on a version mismatch.
    pub fn update_node(&self, node: &Node) -> StateResult<Node> {
        self.update_record(NODES, node)
    }

    /// List all nodes.
    pub fn list_nodes(&self) -> StateResult<Vec<Node>> {
        self.list_records(NODES, "")
    }

    /// Delete a node by name. Returns true if it existed.
    pub fn delete_node(&self, name: &str) -> StateResult<bool> {
        self.delete_record(NODES, name)
    }

    // ── Machines ───────────────────────────────────────────────────

    /// Insert or replace a machine.
    pub fn put_machine(&self, machine: &Machine) -> StateResult<Machine> {
        self.put_record(MACHINES, machine)
    }

    /// Get a machine by namespace and name.
    pub fn get_machine(&self, namespace: &str, name: &str) -> StateResult<Option<Machine>> {
        self.get_record(MACHINES, &namespaced_key(namespace, name))
    }

    /// List all machines in a namespace.
    pub fn list_machines(&self, namespace: &str) -> StateResult<Vec<Machine>> {
        self.list_records(MACHINES, &namespaced_key(namespace, ""))
    }

    /// Delete a machine. Returns true if it existed.
    pub fn delete_machine(&self, namespace: &str, name: &str) -> StateResult<bool> {
        self.delete_record(MACHINES, &namespaced_key(namespace, name))
    }

    // ── Health checks ──────────────────────────────────────────────

    /// Insert or replace a machine health check.
    pub fn put_health_check(&self, mhc: &MachineHealthCheck) -> StateResult<MachineHealthCheck> {
        self.put_record(HEALTH_CHECKS, mhc)
    }

    /// Get a machine health check by namespace and name.
    pub fn get_health_check(
        &self,
        namespace: &str,
        name: &str,
    ) -> StateResult<Option<MachineHealthCheck>> {
        self.get_record(HEALTH_CHECKS, &namespaced_key(namespace, name))
    }

    /// List machine health checks in a namespace, ordered by name.
    pub fn list_health_checks(&self, namespace: &str) -> StateResult<Vec<MachineHealthCheck>> {
        self.list_records(HEALTH_CHECKS, &namespaced_key(namespace, ""))
    }

    /// Delete a machine health check. Returns true if it existed.
    pub fn delete_health_check(&self, namespace: &str, name: &str) -> StateResult<bool> {
        self.delete_record(HEALTH_CHECKS, &namespaced_key(namespace, name))
    }

    // ── Disruption budgets ─────────────────────────────────────────

    /// Insert or replace a disruption budget.
    pub fn put_budget(&self, budget: &DisruptionBudget) -> StateResult<DisruptionBudget> {
        self.put_record(BUDGETS, budget)
    }

    /// Get the budget for a machine group.
    pub fn get_budget(
        &self,
        namespace: &str,
        group: &str,
    ) -> StateResult<Option<DisruptionBudget>> {
        self.get_record(BUDGETS, &namespaced_key(namespace, group))
    }

    /// Write a budget back, failing on a version mismatch.
    pub fn update_budget(&self, budget: &DisruptionBudget) -> StateResult<DisruptionBudget> {
        self.update_record(BUDGETS, budget)
    }

    /// List budgets in a namespace.
    pub fn list_budgets(&self, namespace: &str) -> StateResult<Vec<DisruptionBudget>> {
        self.list_records(BUDGETS, &namespaced_key(namespace, ""))
    }

    // ── Config resources ───────────────────────────────────────────

    /// Insert or replace a config resource.
    pub fn put_config(&self, config: &ConfigResource) -> StateResult<ConfigResource> {
        self.put_record(CONFIGS, config)
    }

    /// Get a config resource by namespace and name.
    pub fn get_config(&self, namespace: &str, name: &str) -> StateResult<Option<ConfigResource>> {
        self.get_record(CONFIGS, &namespaced_key(namespace, name))
    }

    /// Delete a config resource. Returns true if it existed.
    pub fn delete_config(&self, namespace: &str, name: &str) -> StateResult<bool> {
        self.delete_record(CONFIGS, &namespaced_key(namespace, name))
    }
}

/// Read the stored version for `key` inside a write transaction.
fn read_version(
    table: &redb::Table<'_, &'static str, &'static [u8]>,
    key: &str,
) -> StateResult<Option<u64>> {
    let guard = table.get(key).map_err(map_err!(Read))?;
    match guard {
        Some(guard) => {
            let value: serde_json::Value =
                serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
            Ok(Some(
                value
                    .get("resource_version")
                    .and_then(serde_json::Value::as_u64)
                    .unwrap_or(0),
            ))
        }
        None => Ok(None),
    }
}
