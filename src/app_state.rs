//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::service::ServerLifecycleController;
use crate::ws::WebSocketServer;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Lifecycle controller, for health and lifecycle state.
    pub controller: Arc<ServerLifecycleController>,
    /// WebSocket server handling upgrades.
    pub server: Arc<WebSocketServer>,
}

impl AppState {
    /// Builds the state from a running controller.
    #[must_use]
    pub fn new(controller: Arc<ServerLifecycleController>) -> Self {
        let server = Arc::clone(controller.server());
        Self { controller, server }
    }
}
