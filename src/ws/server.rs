//! WebSocket server: connection lifecycle, targeted sends and broadcast.
//!
//! [`WebSocketServer`] sits between the axum upgrade handler and the
//! [`ConnectionRegistry`]. It never blocks the caller: every outbound
//! frame is pushed onto the connection's bounded queue with `try_send`,
//! and the connection's own task performs the socket write under a
//! timeout. A full or closed queue is a per-client delivery failure,
//! logged and counted, never an error for anyone else.

use std::collections::HashSet;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use super::messages::{Envelope, PING, PONG};
use crate::domain::system_event::{SHUTDOWN_NOTICE, ShutdownNotice};
use crate::domain::{
    Connection, ConnectionHandle, ConnectionId, ConnectionRegistry, Metadata, OutboundFrame,
};
use crate::error::BridgeError;

/// Close code sent on server-initiated shutdown (`1001 Going Away`).
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Close reason sent with [`CLOSE_GOING_AWAY`].
pub const SHUTDOWN_REASON: &str = "server shutting down";

/// Transport settings for the WebSocket server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsServerConfig {
    /// Upgrade path, e.g. `/ws`.
    pub path: String,
    /// Log every inbound and outbound frame.
    pub debug: bool,
    /// Outbound frames buffered per connection before sends fail.
    pub send_queue_capacity: usize,
    /// Upper bound on a single socket write.
    pub write_timeout: Duration,
}

impl Default for WsServerConfig {
    fn default() -> Self {
        Self {
            path: "/ws".to_string(),
            debug: false,
            send_queue_capacity: 256,
            write_timeout: Duration::from_secs(5),
        }
    }
}

/// Where the server is in its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Normal operation.
    Accepting,
    /// Shutdown notice sent; ordinary sends and broadcasts are dropped.
    Draining,
    /// Every connection closed; upgrades are refused.
    Closed,
}

impl ServerState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Accepting,
            1 => Self::Draining,
            _ => Self::Closed,
        }
    }

    const fn as_u8(self) -> u8 {
        match self {
            Self::Accepting => 0,
            Self::Draining => 1,
            Self::Closed => 2,
        }
    }
}

/// Lifecycle notification delivered to observers.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerNotification {
    /// A client completed the upgrade.
    Connection {
        /// New connection id.
        client_id: ConnectionId,
        /// Upgrade-time metadata.
        metadata: Metadata,
        /// Peer address.
        remote_address: String,
    },
    /// A client went away. Fires once per connection, whoever closed it.
    Disconnection {
        /// Departed connection id.
        client_id: ConnectionId,
    },
    /// A client sent a well-formed envelope the server does not handle
    /// itself.
    Message {
        /// Sender.
        client_id: ConnectionId,
        /// The decoded envelope.
        envelope: Envelope,
    },
}

/// Callback registered with [`WebSocketServer::observe`].
pub type Observer = Arc<dyn Fn(&ServerNotification) + Send + Sync>;

/// Handle returned by [`WebSocketServer::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverHandle(u64);

/// Optional knobs for [`WebSocketServer::broadcast`].
#[derive(Debug, Clone, Default)]
pub struct BroadcastOptions {
    /// Connections that must not receive the message.
    pub except: HashSet<ConnectionId>,
}

impl BroadcastOptions {
    /// Broadcast to everyone except `ids`.
    #[must_use]
    pub fn excluding(ids: impl IntoIterator<Item = ConnectionId>) -> Self {
        Self {
            except: ids.into_iter().collect(),
        }
    }
}

/// Outcome of a broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections the frame was queued for.
    pub delivered: usize,
    /// Connections whose queue was full or closed.
    pub failed: usize,
}

/// Owns the connection registry and every outbound path to clients.
pub struct WebSocketServer {
    config: WsServerConfig,
    registry: ConnectionRegistry,
    state: AtomicU8,
    /// Serializes admission against `close` so a connection is either
    /// seen by the close snapshot or refused.
    admission: Mutex<()>,
    observers: RwLock<Vec<(u64, Observer)>>,
    next_observer: AtomicU64,
}

impl WebSocketServer {
    /// Creates a server in the [`ServerState::Accepting`] state.
    #[must_use]
    pub fn new(config: WsServerConfig) -> Self {
        if config.debug {
            tracing::warn!(path = %config.path, "websocket debug logging enabled");
        }
        Self {
            config,
            registry: ConnectionRegistry::new(),
            state: AtomicU8::new(ServerState::Accepting.as_u8()),
            admission: Mutex::new(()),
            observers: RwLock::new(Vec::new()),
            next_observer: AtomicU64::new(1),
        }
    }

    /// Transport settings.
    #[must_use]
    pub const fn config(&self) -> &WsServerConfig {
        &self.config
    }

    /// The live connection directory.
    #[must_use]
    pub const fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ServerState {
        ServerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Returns `false` once the server is closed.
    #[must_use]
    pub fn accepts_upgrades(&self) -> bool {
        self.state() != ServerState::Closed
    }

    /// Number of live connections.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.registry.count()
    }

    /// Registers a lifecycle observer.
    pub fn observe<F>(&self, observer: F) -> ObserverHandle
    where
        F: Fn(&ServerNotification) + Send + Sync + 'static,
    {
        let id = self.next_observer.fetch_add(1, Ordering::Relaxed);
        self.observers.write().push((id, Arc::new(observer)));
        ObserverHandle(id)
    }

    /// Removes a lifecycle observer. No-op if it is already gone.
    pub fn unobserve(&self, handle: ObserverHandle) {
        self.observers.write().retain(|(id, _)| *id != handle.0);
    }

    /// Admits a freshly upgraded socket.
    ///
    /// Returns the registered connection and the receiving end of its
    /// outbound queue, or `None` if the server is already closed.
    /// Observers run after the admission lock is released, so they may
    /// call [`WebSocketServer::close`].
    pub fn accept(
        &self,
        remote_address: impl Into<String>,
        metadata: Metadata,
    ) -> Option<(Connection, mpsc::Receiver<OutboundFrame>)> {
        let (connection, rx) = {
            let _admission = self.admission.lock();
            if !self.accepts_upgrades() {
                tracing::debug!("upgrade refused, websocket server closed");
                return None;
            }
            let (handle, rx) = ConnectionHandle::channel(self.config.send_queue_capacity);
            (self.registry.register(handle, remote_address, metadata), rx)
        };
        tracing::info!(
            client_id = %connection.id,
            remote_address = %connection.remote_address,
            clients = self.registry.count(),
            "websocket client connected"
        );
        self.notify(&ServerNotification::Connection {
            client_id: connection.id,
            metadata: connection.metadata.clone(),
            remote_address: connection.remote_address.clone(),
        });
        Some((connection, rx))
    }

    /// Forgets a connection and notifies observers.
    ///
    /// Safe to call from both the socket task and `close`: only the
    /// first call for an id emits [`ServerNotification::Disconnection`].
    /// Returns whether this call did.
    pub fn disconnect(&self, client_id: ConnectionId) -> bool {
        let Some(connection) = self.registry.unregister(client_id) else {
            return false;
        };
        let connected_for = Utc::now() - connection.connected_at;
        tracing::info!(
            client_id = %client_id,
            connected_secs = connected_for.num_seconds(),
            clients = self.registry.count(),
            "websocket client disconnected"
        );
        self.notify(&ServerNotification::Disconnection { client_id });
        true
    }

    /// Sends one message to one client.
    ///
    /// A client that disconnected in the meantime is a benign race; the
    /// error only tells the caller nothing was queued.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::ServerClosed`] while draining or closed.
    /// - [`BridgeError::ConnectionNotFound`] if the client is gone.
    /// - [`BridgeError::Serialization`] if the envelope cannot be encoded.
    /// - [`BridgeError::Backpressure`] or [`BridgeError::ConnectionClosed`]
    ///   if the client's queue refuses the frame.
    pub fn send(
        &self,
        client_id: ConnectionId,
        msg_type: &str,
        payload: serde_json::Value,
    ) -> Result<(), BridgeError> {
        if self.state() != ServerState::Accepting {
            tracing::debug!(client_id = %client_id, msg_type, "send dropped, server shutting down");
            return Err(BridgeError::ServerClosed);
        }
        let Some(connection) = self.registry.get(client_id) else {
            tracing::debug!(client_id = %client_id, msg_type, "send to departed client ignored");
            return Err(BridgeError::ConnectionNotFound(client_id));
        };
        let text = Envelope::new(msg_type, payload).encode()?;
        if self.config.debug {
            tracing::debug!(client_id = %client_id, frame = %text, "ws outbound");
        }
        connection
            .try_send(OutboundFrame::Text(Arc::from(text)))
            .inspect_err(|e| {
                tracing::warn!(client_id = %client_id, error = %e, "delivery to client failed");
            })
    }

    /// Sends one message to every live client not in `options.except`.
    ///
    /// Works on a registry snapshot, so clients connecting mid-broadcast
    /// are not included. Dropped entirely while draining or closed.
    pub fn broadcast(
        &self,
        msg_type: &str,
        payload: serde_json::Value,
        options: &BroadcastOptions,
    ) -> BroadcastReport {
        if self.state() != ServerState::Accepting {
            tracing::debug!(msg_type, "broadcast dropped, server shutting down");
            return BroadcastReport::default();
        }
        self.fan_out(&Envelope::new(msg_type, payload), options)
    }

    /// Enters [`ServerState::Draining`] and sends the shutdown notice to
    /// every client. Returns the delivery report; a second call only
    /// resends the notice if the server is still draining.
    pub fn begin_shutdown(&self, message: &str) -> BroadcastReport {
        let _ = self.state.compare_exchange(
            ServerState::Accepting.as_u8(),
            ServerState::Draining.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if self.state() == ServerState::Closed {
            return BroadcastReport::default();
        }
        let notice = ShutdownNotice {
            message: message.to_string(),
            timestamp: Utc::now(),
        };
        let payload = match serde_json::to_value(&notice) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode shutdown notice");
                return BroadcastReport::default();
            }
        };
        let report = self.fan_out(
            &Envelope::new(SHUTDOWN_NOTICE, payload),
            &BroadcastOptions::default(),
        );
        tracing::info!(
            delivered = report.delivered,
            failed = report.failed,
            "shutdown notice sent"
        );
        report
    }

    /// Refuses further upgrades and closes every live connection.
    ///
    /// Each client gets a `1001` close frame queued behind anything
    /// already pending. A client whose queue is full still closes: its
    /// writer is signalled directly and closes after draining. Later
    /// calls are no-ops.
    pub fn close(&self) {
        let snapshot = {
            let _admission = self.admission.lock();
            let previous = self
                .state
                .swap(ServerState::Closed.as_u8(), Ordering::AcqRel);
            if ServerState::from_u8(previous) == ServerState::Closed {
                return;
            }
            self.registry.all()
        };

        tracing::info!(clients = snapshot.len(), "closing websocket server");
        for connection in &snapshot {
            let frame = OutboundFrame::Close {
                code: CLOSE_GOING_AWAY,
                reason: SHUTDOWN_REASON,
            };
            if let Err(e) = connection.try_send(frame) {
                tracing::warn!(client_id = %connection.id, error = %e, "close frame not queued");
            }
            connection.request_close();
            let _ = self.disconnect(connection.id);
        }
    }

    /// Handles one inbound text frame from `client_id`.
    ///
    /// Malformed frames are logged and dropped. `ping` is answered on
    /// the same connection unless shutdown has started; everything else
    /// goes to observers.
    pub fn handle_inbound(&self, client_id: ConnectionId, text: &str) {
        if self.config.debug {
            tracing::debug!(client_id = %client_id, frame = text, "ws inbound");
        }
        let envelope = match Envelope::decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(client_id = %client_id, error = %e, "malformed frame dropped");
                return;
            }
        };

        if envelope.msg_type == PING {
            let _ = self.send(client_id, PONG, serde_json::json!({ "timestamp": Utc::now() }));
            return;
        }

        self.notify(&ServerNotification::Message {
            client_id,
            envelope,
        });
    }

    fn fan_out(&self, envelope: &Envelope, options: &BroadcastOptions) -> BroadcastReport {
        let Some(text) = self.encode(envelope) else {
            return BroadcastReport::default();
        };
        let mut report = BroadcastReport::default();
        for connection in self.registry.all() {
            if options.except.contains(&connection.id) {
                continue;
            }
            if self.deliver(&connection, Arc::clone(&text)) {
                report.delivered += 1;
            } else {
                report.failed += 1;
            }
        }
        if self.config.debug {
            tracing::debug!(
                msg_type = %envelope.msg_type,
                delivered = report.delivered,
                failed = report.failed,
                "ws broadcast"
            );
        }
        report
    }

    fn deliver(&self, connection: &Connection, text: Arc<str>) -> bool {
        if self.config.debug {
            tracing::debug!(client_id = %connection.id, frame = %text, "ws outbound");
        }
        match connection.try_send(OutboundFrame::Text(text)) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(client_id = %connection.id, error = %e, "delivery to client failed");
                false
            }
        }
    }

    fn encode(&self, envelope: &Envelope) -> Option<Arc<str>> {
        match envelope.encode() {
            Ok(text) => Some(Arc::from(text)),
            Err(e) => {
                tracing::error!(msg_type = %envelope.msg_type, error = %e, "failed to encode envelope");
                None
            }
        }
    }

    fn notify(&self, notification: &ServerNotification) {
        let observers = self.observers.read().clone();
        for (id, observer) in &observers {
            if catch_unwind(AssertUnwindSafe(|| observer(notification))).is_err() {
                tracing::error!(observer = id, "websocket lifecycle observer panicked");
            }
        }
    }
}

impl fmt::Debug for WebSocketServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketServer")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("clients", &self.registry.count())
            .field("observers", &self.observers.read().len())
            .finish()
    }
}
