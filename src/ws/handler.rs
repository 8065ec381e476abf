//! Axum WebSocket upgrade handler.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::HeaderMap;
use axum::http::header::USER_AGENT;
use axum::response::{IntoResponse, Response};

use super::connection::run_connection;
use crate::app_state::AppState;
use crate::domain::Metadata;
use crate::error::BridgeError;

/// `GET <ws path>`: Upgrade the HTTP connection to a WebSocket.
///
/// Query parameters and the `User-Agent` header become the connection's
/// metadata. A request that is not a valid upgrade gets the ordinary
/// HTTP rejection response; once the server is closed every request is
/// answered with `503`.
pub async fn ws_handler(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let ws = match upgrade {
        Ok(ws) => ws,
        Err(rejection) => {
            tracing::debug!(%remote, error = %rejection, "not a websocket upgrade");
            return rejection.into_response();
        }
    };
    if !state.server.accepts_upgrades() {
        return BridgeError::ServerClosed.into_response();
    }

    let metadata = upgrade_metadata(params, &headers);
    let server = Arc::clone(&state.server);

    ws.on_failed_upgrade(move |e| {
        tracing::warn!(%remote, error = %e, "websocket upgrade failed");
    })
    .on_upgrade(move |socket| async move {
        let Some((connection, outbound)) = server.accept(remote.to_string(), metadata) else {
            return;
        };
        // Only the registry may keep a sender alive, so the queue ends
        // once the server forgets this client.
        let client_id = connection.id;
        let closing = connection.close_signal();
        drop(connection);
        run_connection(socket, server, client_id, outbound, closing).await;
    })
}

fn upgrade_metadata(params: HashMap<String, String>, headers: &HeaderMap) -> Metadata {
    let mut metadata: Metadata = params
        .into_iter()
        .map(|(k, v)| (k, serde_json::Value::String(v)))
        .collect();
    if let Some(agent) = headers.get(USER_AGENT).and_then(|v| v.to_str().ok()) {
        metadata.insert(
            "userAgent".to_string(),
            serde_json::Value::String(agent.to_string()),
        );
    }
    metadata
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn metadata_combines_query_and_user_agent() {
        let mut params = HashMap::new();
        params.insert("store".to_string(), "S-12".to_string());
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("till/2.1"));

        let metadata = upgrade_metadata(params, &headers);
        assert_eq!(metadata.get("store"), Some(&serde_json::json!("S-12")));
        assert_eq!(metadata.get("userAgent"), Some(&serde_json::json!("till/2.1")));
    }

    #[test]
    fn metadata_is_empty_without_inputs() {
        assert!(upgrade_metadata(HashMap::new(), &HeaderMap::new()).is_empty());
    }
}
