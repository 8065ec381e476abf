//! pos-realtime server entry point.
//!
//! Starts the Axum HTTP server with the REST health surface and the
//! WebSocket event bridge, and exits once graceful shutdown completes.

use std::net::SocketAddr;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use pos_realtime::app_state::AppState;
use pos_realtime::config::{BridgeConfig, LogFormat};
use pos_realtime::domain::EventBus;
use pos_realtime::error::BridgeError;
use pos_realtime::router::build_app;
use pos_realtime::service::ServerLifecycleController;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing before anything can log
    dotenvy::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match LogFormat::from_env() {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    // Load configuration
    let config = BridgeConfig::from_env().context("loading configuration")?;
    tracing::info!(addr = %config.listen_addr, env = %config.environment, "starting pos-realtime");

    // Bind first: an unusable listener is the only fatal startup error
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .map_err(|source| BridgeError::Bind {
            addr: config.listen_addr,
            source,
        })?;

    // Wire bus, server and bridge
    let event_bus = EventBus::new();
    let controller = ServerLifecycleController::start(&config, &event_bus);
    let _signals = controller.spawn_signal_listener();

    let app = build_app(AppState::new(std::sync::Arc::clone(&controller)));
    tracing::info!(addr = %config.listen_addr, ws_path = %config.ws_path, "server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(controller.stopped())
    .await
    .context("http server failed")?;

    tracing::info!("pos-realtime stopped");
    Ok(())
}
