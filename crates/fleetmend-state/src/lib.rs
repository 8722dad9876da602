//! fleetmend-state: embedded state store for fleetmend.
//!
//! Backed by [redb](https://docs.rs/redb), holds the objects the remediation
//! controller reads and mutates: nodes, machines, machine health checks,
//! disruption budgets and config resources.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Namespaced records use `{namespace}/{name}` keys, nodes are keyed by name.
//!
//! Every record carries a `resource_version`. `update_*` operations compare
//! it inside the write transaction and fail with [`StateError::Conflict`]
//! when another writer got there first, which gives callers the optimistic
//! concurrency contract the controller relies on.
//!
//! The controller never talks to `StateStore` directly; it goes through the
//! [`FleetClient`] trait so tests can wrap the store and inject failures.

pub mod client;
pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use client::FleetClient;
pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
