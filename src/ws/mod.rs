//! WebSocket layer: upgrade handling, the per-connection socket loop,
//! the wire envelope, and the [`server::WebSocketServer`] that owns
//! every live connection.
//!
//! The upgrade endpoint's path is configurable (default `/ws`) and is
//! served on the same listener as the REST API.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod server;

use axum::Router;
use axum::routing::get;

use crate::app_state::AppState;

pub use server::{
    BroadcastOptions, BroadcastReport, ServerNotification, ServerState, WebSocketServer,
    WsServerConfig,
};

/// Mounts the upgrade handler at `path`.
pub fn routes(path: &str) -> Router<AppState> {
    Router::new().route(path, get(handler::ws_handler))
}
