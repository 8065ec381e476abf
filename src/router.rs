//! Full HTTP application: REST API, WebSocket upgrade route, and the
//! tower-http layers shared by both.

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::app_state::AppState;
use crate::ws;

/// Builds the router served on the single HTTP listener.
///
/// The WebSocket handler needs the peer address, so serve the result
/// with `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn build_app(state: AppState) -> Router {
    let ws_path = state.server.config().path.clone();
    Router::new()
        .merge(api::build_router())
        .merge(ws::routes(&ws_path))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
