//! Process lifecycle: startup wiring, signal handling, graceful shutdown.
//!
//! [`ServerLifecycleController`] moves through
//! `Starting → Running → Stopping → Stopped` exactly once. The current
//! state lives in a [`watch`] channel so the HTTP server can await
//! `Stopped` for its own graceful shutdown.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::event_bridge::EventBridge;
use crate::config::BridgeConfig;
use crate::domain::system_event::{ServerStarted, ServerStopping};
use crate::domain::{EventBus, SystemEvent};
use crate::ws::WebSocketServer;

/// Message carried by the shutdown notice sent to every client.
pub const SHUTDOWN_MESSAGE: &str = "Server is shutting down";

/// Lifecycle states, in the only order they can occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Components are being wired.
    Starting,
    /// Serving clients.
    Running,
    /// Graceful shutdown in progress.
    Stopping,
    /// Shutdown complete; the process may exit.
    Stopped,
}

/// Point-in-time health of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    /// `"online"` while running, otherwise the lifecycle state.
    pub status: &'static str,
    /// Live WebSocket connections.
    pub clients: usize,
    /// Whole seconds since startup.
    pub uptime_seconds: u64,
}

/// Owns the bridge wiring and drives the shutdown protocol.
#[derive(Debug)]
pub struct ServerLifecycleController {
    bus: EventBus,
    server: Arc<WebSocketServer>,
    bridge: EventBridge,
    environment: String,
    grace_period: Duration,
    started_at: Instant,
    state: watch::Sender<LifecycleState>,
}

impl ServerLifecycleController {
    /// Builds the WebSocket server and the bridge, publishes
    /// `system.serverStarted`, and enters [`LifecycleState::Running`].
    #[must_use]
    pub fn start(config: &BridgeConfig, bus: &EventBus) -> Arc<Self> {
        let (state, _) = watch::channel(LifecycleState::Starting);
        let server = Arc::new(WebSocketServer::new(config.ws_server()));
        let bridge = EventBridge::attach(bus, &server, config.bridge());

        let controller = Arc::new(Self {
            bus: bus.clone(),
            server,
            bridge,
            environment: config.environment.clone(),
            grace_period: config.shutdown_grace(),
            started_at: Instant::now(),
            state,
        });

        let _ = controller
            .bus
            .emit(&SystemEvent::ServerStarted(ServerStarted {
                environment: controller.environment.clone(),
                timestamp: Utc::now(),
            }));
        controller.state.send_replace(LifecycleState::Running);
        tracing::info!(
            environment = %controller.environment,
            ws_path = %controller.server.config().path,
            "realtime bridge running"
        );
        controller
    }

    /// The WebSocket server wired by this controller.
    #[must_use]
    pub const fn server(&self) -> &Arc<WebSocketServer> {
        &self.server
    }

    /// The bus this controller publishes lifecycle events on.
    #[must_use]
    pub const fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Health accessor backing `GET /api/v1/ws-health`.
    #[must_use]
    pub fn health(&self) -> HealthSnapshot {
        let status = match self.state() {
            LifecycleState::Running => "online",
            LifecycleState::Starting => "starting",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
        };
        HealthSnapshot {
            status,
            clients: self.server.client_count(),
            uptime_seconds: self.started_at.elapsed().as_secs(),
        }
    }

    /// Resolves once the controller reaches [`LifecycleState::Stopped`].
    pub fn stopped(&self) -> impl Future<Output = ()> + Send + use<> {
        let mut rx = self.state.subscribe();
        async move {
            let _ = rx.wait_for(|s| *s == LifecycleState::Stopped).await;
        }
    }

    /// Runs the graceful shutdown sequence.
    ///
    /// 1. broadcast `system:shutdown` to every client,
    /// 2. publish `system.serverStopping`,
    /// 3. close the WebSocket server,
    /// 4. wait the grace period, then shut the bus down.
    ///
    /// Only the first call runs the sequence; every other call returns
    /// `false` immediately. Delivery failures are logged and never stop
    /// the sequence.
    pub async fn shutdown(&self) -> bool {
        let entered = self.state.send_if_modified(|s| {
            if *s == LifecycleState::Running {
                *s = LifecycleState::Stopping;
                true
            } else {
                false
            }
        });
        if !entered {
            tracing::debug!(state = ?self.state(), "shutdown already underway");
            return false;
        }
        tracing::info!(clients = self.server.client_count(), "graceful shutdown started");

        let report = self.server.begin_shutdown(SHUTDOWN_MESSAGE);
        if report.failed > 0 {
            tracing::warn!(
                failed = report.failed,
                "shutdown notice not delivered to every client"
            );
        }

        let _ = self
            .bus
            .emit(&SystemEvent::ServerStopping(ServerStopping {
                environment: self.environment.clone(),
                clients: self.server.client_count(),
                timestamp: Utc::now(),
            }));

        self.server.close();

        tokio::time::sleep(self.grace_period).await;

        self.bridge.detach();
        self.bus.shutdown();
        self.state.send_replace(LifecycleState::Stopped);
        tracing::info!(
            uptime_secs = self.started_at.elapsed().as_secs(),
            "graceful shutdown complete"
        );
        true
    }

    /// Starts the shutdown sequence on a background task.
    ///
    /// Returns `None` if shutdown has already begun, so repeated
    /// termination signals do not re-enter the sequence.
    pub fn request_shutdown(self: &Arc<Self>, reason: &str) -> Option<JoinHandle<bool>> {
        if self.state() != LifecycleState::Running {
            tracing::warn!(reason, "termination request ignored, shutdown already underway");
            return None;
        }
        tracing::info!(reason, "termination requested");
        let controller = Arc::clone(self);
        Some(tokio::spawn(async move { controller.shutdown().await }))
    }

    /// Listens for SIGINT/SIGTERM and requests shutdown on each one.
    pub fn spawn_signal_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            let mut signals = match TerminationSignals::new() {
                Ok(signals) => signals,
                Err(e) => {
                    tracing::error!(error = %e, "cannot install signal handlers");
                    return;
                }
            };
            while let Some(signal) = signals.recv().await {
                let _ = controller.request_shutdown(signal);
            }
        })
    }
}

/// Standard termination signals: Ctrl-C everywhere, SIGTERM on Unix.
struct TerminationSignals {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl TerminationSignals {
    fn new() -> std::io::Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            terminate: tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?,
        })
    }

    #[cfg(unix)]
    async fn recv(&mut self) -> Option<&'static str> {
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.ok().map(|()| "SIGINT"),
            sig = self.terminate.recv() => sig.map(|()| "SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) -> Option<&'static str> {
        tokio::signal::ctrl_c().await.ok().map(|()| "ctrl-c")
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::system_event::{SERVER_STARTED, SERVER_STOPPING, SHUTDOWN_NOTICE};
    use crate::domain::{Event, Metadata, OutboundFrame};
    use parking_lot::Mutex;

    fn config() -> BridgeConfig {
        BridgeConfig {
            shutdown_grace_ms: 10,
            environment: "test".to_string(),
            ..BridgeConfig::default()
        }
    }

    fn record(bus: &EventBus, pattern: &str) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _ = bus.subscribe(pattern, move |e: &Event| {
            sink.lock().push(e.name().to_string());
            Ok(())
        });
        seen
    }

    #[tokio::test]
    async fn start_publishes_server_started_and_runs() {
        let bus = EventBus::new();
        let started = record(&bus, SERVER_STARTED);
        let controller = ServerLifecycleController::start(&config(), &bus);

        assert_eq!(controller.state(), LifecycleState::Running);
        assert_eq!(started.lock().len(), 1);
        let health = controller.health();
        assert_eq!(health.status, "online");
        assert_eq!(health.clients, 0);
    }

    #[tokio::test]
    async fn shutdown_runs_sequence_in_order() {
        let bus = EventBus::new();
        let controller = ServerLifecycleController::start(&config(), &bus);
        let Some((_conn, mut rx)) = controller.server().accept("127.0.0.1:9", Metadata::new())
        else {
            panic!("server should accept");
        };
        let server = Arc::clone(controller.server());
        let accepting_when_stopping = Arc::new(Mutex::new(None));
        let probe = Arc::clone(&accepting_when_stopping);
        let _ = bus.subscribe(SERVER_STOPPING, move |_: &Event| {
            *probe.lock() = Some(server.accepts_upgrades());
            Ok(())
        });

        assert!(controller.shutdown().await);

        // Notice first, then the close frame.
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        let notice_at = frames.iter().position(
            |f| matches!(f, OutboundFrame::Text(t) if t.contains(SHUTDOWN_NOTICE)),
        );
        let close_at = frames
            .iter()
            .position(|f| matches!(f, OutboundFrame::Close { .. }));
        let (Some(notice_at), Some(close_at)) = (notice_at, close_at) else {
            panic!("expected notice and close frames, got {frames:?}");
        };
        assert!(notice_at < close_at);

        assert_eq!(*accepting_when_stopping.lock(), Some(true));
        assert_eq!(controller.state(), LifecycleState::Stopped);
        assert_eq!(controller.health().clients, 0);
        assert!(bus.is_shut_down());
    }

    #[tokio::test]
    async fn concurrent_shutdowns_run_once() {
        let bus = EventBus::new();
        let stopping = record(&bus, SERVER_STOPPING);
        let controller = ServerLifecycleController::start(&config(), &bus);

        let (a, b) = tokio::join!(controller.shutdown(), controller.shutdown());
        assert!(a ^ b);
        assert_eq!(stopping.lock().len(), 1);
        assert!(!controller.shutdown().await);
    }

    #[tokio::test]
    async fn repeated_termination_requests_are_idempotent() {
        let bus = EventBus::new();
        let stopping = record(&bus, SERVER_STOPPING);
        let controller = ServerLifecycleController::start(&config(), &bus);

        let first = controller.request_shutdown("SIGTERM");
        let second = controller.request_shutdown("SIGTERM");

        let mut ran = 0;
        for handle in [first, second].into_iter().flatten() {
            let Ok(entered) = handle.await else {
                panic!("shutdown task panicked");
            };
            if entered {
                ran += 1;
            }
        }
        assert_eq!(ran, 1);
        assert_eq!(stopping.lock().len(), 1);
        assert!(controller.request_shutdown("SIGINT").is_none());
    }

    #[tokio::test]
    async fn stopped_resolves_after_shutdown() {
        let bus = EventBus::new();
        let controller = ServerLifecycleController::start(&config(), &bus);
        let stopped = controller.stopped();

        let Some(handle) = controller.request_shutdown("test") else {
            panic!("first request should start shutdown");
        };
        let waited = tokio::time::timeout(Duration::from_secs(2), stopped).await;
        tokio_test::assert_ok!(waited);
        let _ = handle.await;
    }

    #[tokio::test]
    async fn shutdown_completes_when_a_client_is_unreachable() {
        let bus = EventBus::new();
        let controller = ServerLifecycleController::start(&config(), &bus);
        let Some((_conn, rx)) = controller.server().accept("127.0.0.1:9", Metadata::new()) else {
            panic!("server should accept");
        };
        drop(rx);

        assert!(controller.shutdown().await);
        assert_eq!(controller.state(), LifecycleState::Stopped);
    }
}
