//! fleetmend-metrics: observability for the remediation controller.
//!
//! Counts reconcile outcomes and remediations per machine group, and renders
//! them in Prometheus text format.
//!
//! # Architecture
//!
//! ```text
//! RemediationMetrics
//!   ├── record(Counter)            ← called once per reconcile outcome
//!   ├── record_remediation(group)  ← called per deletion / reboot request
//!   └── snapshot() → MetricsSnapshot
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```

pub mod counters;
pub mod prometheus;

pub use counters::{Counter, MetricsSnapshot, RemediationAction, RemediationMetrics};
pub use prometheus::render_prometheus;
