//! REST API handlers.
//!
//! Each handler reads/writes via `StateStore` and returns JSON responses.
//! Writes are unconditional upserts; the object's identity comes from the
//! path, overriding whatever the body says.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use tracing::{debug, warn};

use fleetmend_controller::Trigger;
use fleetmend_state::*;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn internal_error(e: impl std::fmt::Display) -> axum::response::Response {
    error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response()
}

fn notify(state: &ApiState, trigger: Trigger) {
    debug!(%trigger, "emitting reconcile trigger");
    if state.triggers.send(trigger).is_err() {
        warn!("trigger channel closed, change will be picked up on resync");
    }
}

// ── Nodes ──────────────────────────────────────────────────────

/// GET /api/v1/nodes
pub async fn list_nodes(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_nodes() {
        Ok(nodes) => ApiResponse::ok(nodes).into_response(),
        Err(e) => internal_error(e),
    }
}

/// GET /api/v1/nodes/{name}
pub async fn get_node(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.store.get_node(&name) {
        Ok(Some(node)) => ApiResponse::ok(node).into_response(),
        Ok(None) => error_response("node not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => internal_error(e),
    }
}

/// PUT /api/v1/nodes/{name}
pub async fn put_node(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Json(mut node): Json<Node>,
) -> impl IntoResponse {
    node.name = name;
    match state.store.put_node(&node) {
        Ok(stored) => {
            notify(&state, Trigger::node(&stored.name));
            ApiResponse::ok(stored).into_response()
        }
        Err(e) => internal_error(e),
    }
}

/// GET /api/v1/nodes/{name}/evaluation
pub async fn evaluate_node(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.reconciler.evaluate_node(&name, Utc::now()) {
        Ok(Some(report)) => ApiResponse::ok(report).into_response(),
        Ok(None) => error_response("node not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => internal_error(e),
    }
}

// ── Machines ───────────────────────────────────────────────────

/// GET /api/v1/machines/{namespace}
pub async fn list_machines(
    State(state): State<ApiState>,
    Path(namespace): Path<String>,
) -> impl IntoResponse {
    match state.store.list_machines(&namespace) {
        Ok(machines) => ApiResponse::ok(machines).into_response(),
        Err(e) => internal_error(e),
    }
}

/// GET /api/v1/machines/{namespace}/{name}
pub async fn get_machine(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.store.get_machine(&namespace, &name) {
        Ok(Some(machine)) => ApiResponse::ok(machine).into_response(),
        Ok(None) => error_response("machine not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => internal_error(e),
    }
}

/// PUT /api/v1/machines/{namespace}/{name}
///
/// Label and owner changes can change which policy covers the machine, so
/// its node is re-triggered.
pub async fn put_machine(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
    Json(mut machine): Json<Machine>,
) -> impl IntoResponse {
    machine.namespace = namespace;
    machine.name = name;
    match state.store.put_machine(&machine) {
        Ok(stored) => {
            if let Some(node) = stored.node_name() {
                notify(&state, Trigger::node(node));
            }
            ApiResponse::ok(stored).into_response()
        }
        Err(e) => internal_error(e),
    }
}

/// DELETE /api/v1/machines/{namespace}/{name}
pub async fn delete_machine(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.store.delete_machine(&namespace, &name) {
        Ok(true) => ApiResponse::ok("deleted").into_response(),
        Ok(false) => error_response("machine not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => internal_error(e),
    }
}

// ── Health checks ──────────────────────────────────────────────

/// GET /api/v1/healthchecks/{namespace}
pub async fn list_health_checks(
    State(state): State<ApiState>,
    Path(namespace): Path<String>,
) -> impl IntoResponse {
    match state.store.list_health_checks(&namespace) {
        Ok(checks) => ApiResponse::ok(checks).into_response(),
        Err(e) => internal_error(e),
    }
}

/// GET /api/v1/healthchecks/{namespace}/{name}
pub async fn get_health_check(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.store.get_health_check(&namespace, &name) {
        Ok(Some(check)) => ApiResponse::ok(check).into_response(),
        Ok(None) => error_response("health check not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => internal_error(e),
    }
}

/// PUT /api/v1/healthchecks/{namespace}/{name}
pub async fn put_health_check(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
    Json(mut check): Json<MachineHealthCheck>,
) -> impl IntoResponse {
    check.namespace = namespace;
    check.name = name;
    match state.store.put_health_check(&check) {
        Ok(stored) => {
            notify(&state, Trigger::health_check(&stored.namespace, &stored.name));
            ApiResponse::ok(stored).into_response()
        }
        Err(e) => internal_error(e),
    }
}

/// DELETE /api/v1/healthchecks/{namespace}/{name}
pub async fn delete_health_check(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.store.delete_health_check(&namespace, &name) {
        Ok(true) => {
            notify(&state, Trigger::health_check(&namespace, &name));
            ApiResponse::ok("deleted").into_response()
        }
        Ok(false) => {
            error_response("health check not found", StatusCode::NOT_FOUND).into_response()
        }
        Err(e) => internal_error(e),
    }
}

// ── Disruption budgets ─────────────────────────────────────────

/// GET /api/v1/budgets/{namespace}
pub async fn list_budgets(
    State(state): State<ApiState>,
    Path(namespace): Path<String>,
) -> impl IntoResponse {
    match state.store.list_budgets(&namespace) {
        Ok(budgets) => ApiResponse::ok(budgets).into_response(),
        Err(e) => internal_error(e),
    }
}

/// GET /api/v1/budgets/{namespace}/{group}
pub async fn get_budget(
    State(state): State<ApiState>,
    Path((namespace, group)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.store.get_budget(&namespace, &group) {
        Ok(Some(budget)) => ApiResponse::ok(budget).into_response(),
        Ok(None) => error_response("budget not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => internal_error(e),
    }
}

/// PUT /api/v1/budgets/{namespace}/{group}
pub async fn put_budget(
    State(state): State<ApiState>,
    Path((namespace, group)): Path<(String, String)>,
    Json(mut budget): Json<DisruptionBudget>,
) -> impl IntoResponse {
    budget.namespace = namespace;
    budget.group = group;
    match state.store.put_budget(&budget) {
        Ok(stored) => ApiResponse::ok(stored).into_response(),
        Err(e) => internal_error(e),
    }
}

// ── Config resources ───────────────────────────────────────────

/// GET /api/v1/configs/{namespace}/{name}
pub async fn get_config(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.store.get_config(&namespace, &name) {
        Ok(Some(config)) => ApiResponse::ok(config).into_response(),
        Ok(None) => error_response("config not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => internal_error(e),
    }
}

/// PUT /api/v1/configs/{namespace}/{name}
pub async fn put_config(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
    Json(mut config): Json<ConfigResource>,
) -> impl IntoResponse {
    config.namespace = namespace;
    config.name = name;
    match state.store.put_config(&config) {
        Ok(stored) => ApiResponse::ok(stored).into_response(),
        Err(e) => internal_error(e),
    }
}

/// DELETE /api/v1/configs/{namespace}/{name}
///
/// Removing the unhealthy conditions resource puts evaluation back on the
/// built-in default.
pub async fn delete_config(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.store.delete_config(&namespace, &name) {
        Ok(true) => ApiResponse::ok("deleted").into_response(),
        Ok(false) => error_response("config not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => internal_error(e),
    }
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshot = state.reconciler.metrics().snapshot();
    let body = fleetmend_metrics::render_prometheus(&snapshot);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
