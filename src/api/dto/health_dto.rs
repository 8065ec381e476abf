//! Health endpoint response bodies.

use serde::Serialize;
use utoipa::ToSchema;

use crate::service::{HealthSnapshot, LifecycleState};

/// Body of `GET /api/v1/ws-health`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WsHealthResponse {
    /// `"online"` while the bridge is running.
    pub status: String,
    /// Live WebSocket connections.
    pub clients: usize,
    /// Seconds since startup.
    pub uptime: u64,
}

impl From<HealthSnapshot> for WsHealthResponse {
    fn from(snapshot: HealthSnapshot) -> Self {
        Self {
            status: snapshot.status.to_string(),
            clients: snapshot.clients,
            uptime: snapshot.uptime_seconds,
        }
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthResponse {
    /// `"healthy"` while running, `"unavailable"` otherwise.
    pub status: String,
    /// Lifecycle state (`running`, `stopping`, ...).
    #[schema(value_type = String)]
    pub lifecycle: LifecycleState,
    /// ISO-8601 server time.
    pub timestamp: String,
    /// Crate version.
    pub version: String,
}
