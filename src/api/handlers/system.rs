//! System endpoints: liveness and WebSocket health.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;

use crate::api::dto::{HealthResponse, WsHealthResponse};
use crate::app_state::AppState;
use crate::service::LifecycleState;

/// `GET /health`: Service liveness and lifecycle state.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Returns 200 while the bridge is running and 503 while it is starting or shutting down.",
    responses(
        (status = 200, description = "Service is running", body = HealthResponse),
        (status = 503, description = "Service is starting or shutting down", body = HealthResponse),
    )
)]
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let lifecycle = state.controller.state();
    let (status, label) = if lifecycle == LifecycleState::Running {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    };
    (
        status,
        Json(HealthResponse {
            status: label.to_string(),
            lifecycle,
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// `GET /api/v1/ws-health`: WebSocket bridge status.
#[utoipa::path(
    get,
    path = "/api/v1/ws-health",
    tag = "System",
    summary = "WebSocket health",
    description = "Returns the bridge status, the number of connected WebSocket clients and the uptime in seconds.",
    responses(
        (status = 200, description = "Bridge status", body = WsHealthResponse),
    )
)]
pub async fn ws_health_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(WsHealthResponse::from(state.controller.health())),
    )
}

/// Routes mounted under `/api/v1`.
pub fn api_routes() -> Router<AppState> {
    Router::new().route("/ws-health", get(ws_health_handler))
}

/// System routes mounted at the root level (not under /api/v1).
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_handler))
}
