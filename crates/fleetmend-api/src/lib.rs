//! fleetmend-api: REST API for fleetmend.
//!
//! The provisioning side of the controller. Registers nodes, machines,
//! health checks, disruption budgets and config resources in the state
//! store, and emits a [`Trigger`] for every change that can alter a
//! remediation decision.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/nodes` | List nodes |
//! | GET/PUT | `/api/v1/nodes/{name}` | Get / upsert a node (triggers it) |
//! | GET | `/api/v1/nodes/{name}/evaluation` | Dry-run health evaluation |
//! | GET | `/api/v1/machines/{namespace}` | List machines |
//! | GET/PUT/DELETE | `/api/v1/machines/{namespace}/{name}` | Machine CRUD |
//! | GET | `/api/v1/healthchecks/{namespace}` | List health checks |
//! | GET/PUT/DELETE | `/api/v1/healthchecks/{namespace}/{name}` | Health check CRUD (fans out) |
//! | GET | `/api/v1/budgets/{namespace}` | List disruption budgets |
//! | GET/PUT | `/api/v1/budgets/{namespace}/{group}` | Disruption budget get / upsert |
//! | GET/PUT/DELETE | `/api/v1/configs/{namespace}/{name}` | Config resource CRUD |
//! | GET | `/metrics` | Prometheus exposition |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tokio::sync::mpsc;

use fleetmend_controller::{Reconciler, Trigger};
use fleetmend_state::StateStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    /// Reconcile triggers, consumed by the dispatcher.
    pub triggers: mpsc::UnboundedSender<Trigger>,
    /// Used for dry-run evaluations and its metrics.
    pub reconciler: Arc<Reconciler>,
}

/// Build the complete API router (REST + metrics).
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/nodes", get(handlers::list_nodes))
        .route("/nodes/{name}", get(handlers::get_node).put(handlers::put_node))
        .route("/nodes/{name}/evaluation", get(handlers::evaluate_node))
        .route("/machines/{namespace}", get(handlers::list_machines))
        .route(
            "/machines/{namespace}/{name}",
            get(handlers::get_machine)
                .put(handlers::put_machine)
                .delete(handlers::delete_machine),
        )
        .route("/healthchecks/{namespace}", get(handlers::list_health_checks))
        .route(
            "/healthchecks/{namespace}/{name}",
            get(handlers::get_health_check)
                .put(handlers::put_health_check)
                .delete(handlers::delete_health_check),
        )
        .route("/budgets/{namespace}", get(handlers::list_budgets))
        .route(
            "/budgets/{namespace}/{group}",
            get(handlers::get_budget).put(handlers::put_budget),
        )
        .route(
            "/configs/{namespace}/{name}",
            get(handlers::get_config)
                .put(handlers::put_config)
                .delete(handlers::delete_config),
        )
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::prometheus_metrics).with_state(state))
}
