//! Two-way glue between the [`EventBus`] and the [`WebSocketServer`].
//!
//! Outbound: every bus event whose name is not excluded is broadcast to
//! all clients as `{"type": name, "data": payload}`. Inbound: server
//! lifecycle notifications are republished on the bus as `system.*`
//! events. Neither side knows about the other; only the bridge holds
//! both.

use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::Mutex;

use crate::domain::system_event::{ClientConnected, ClientDisconnected, ClientMessage};
use crate::domain::{Event, EventBus, ExclusionSet, SubscriptionHandle, SystemEvent};
use crate::ws::server::{BroadcastOptions, ObserverHandle, ServerNotification, WebSocketServer};

/// Construction options for [`EventBridge`].
#[derive(Debug, Clone, Default)]
pub struct BridgeOptions {
    /// Event-name patterns never forwarded to clients.
    pub exclusions: ExclusionSet,
    /// Log every forwarded and withheld event.
    pub debug: bool,
}

/// Live wiring between one bus and one WebSocket server.
///
/// Dropping the bridge, or calling [`EventBridge::detach`], removes both
/// registrations.
#[derive(Debug)]
pub struct EventBridge {
    bus: EventBus,
    server: Arc<WebSocketServer>,
    exclusions: Arc<ExclusionSet>,
    subscription: Mutex<Option<SubscriptionHandle>>,
    observer: Mutex<Option<ObserverHandle>>,
}

impl EventBridge {
    /// Subscribes to every bus event and observes the server's lifecycle.
    #[must_use]
    pub fn attach(bus: &EventBus, server: &Arc<WebSocketServer>, options: BridgeOptions) -> Self {
        let exclusions = Arc::new(options.exclusions);

        let subscription = bus.subscribe(
            "*",
            outbound_handler(Arc::downgrade(server), Arc::clone(&exclusions), options.debug),
        );

        let inbound_bus = bus.clone();
        let observer = server.observe(move |notification: &ServerNotification| {
            let _ = inbound_bus.emit(&to_system_event(notification));
        });

        tracing::info!(
            exclusions = exclusions.len(),
            debug = options.debug,
            "event bridge attached"
        );

        Self {
            bus: bus.clone(),
            server: Arc::clone(server),
            exclusions,
            subscription: Mutex::new(Some(subscription)),
            observer: Mutex::new(Some(observer)),
        }
    }

    /// The exclusion set this bridge was built with.
    #[must_use]
    pub fn exclusions(&self) -> &ExclusionSet {
        &self.exclusions
    }

    /// Removes the bus subscription and the server observer. Idempotent.
    pub fn detach(&self) {
        let subscription = self.subscription.lock().take();
        let observer = self.observer.lock().take();
        if let Some(handle) = subscription {
            self.bus.unsubscribe(handle);
        }
        if let Some(handle) = observer {
            self.server.unobserve(handle);
        }
        if subscription.is_some() || observer.is_some() {
            tracing::info!("event bridge detached");
        }
    }
}

impl Drop for EventBridge {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Bus handler forwarding permitted events to every client.
///
/// Holds the server weakly: the server owns the observer that owns the
/// bus handle, and a strong reference here would close the cycle.
fn outbound_handler(
    server: Weak<WebSocketServer>,
    exclusions: Arc<ExclusionSet>,
    debug: bool,
) -> impl Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static {
    move |event: &Event| {
        if exclusions.is_excluded(event.name()) {
            if debug {
                tracing::debug!(event = event.name(), "event withheld from clients");
            }
            return Ok(());
        }
        let Some(server) = server.upgrade() else {
            return Ok(());
        };
        let report = server.broadcast(
            event.name(),
            event.payload().clone(),
            &BroadcastOptions::default(),
        );
        if debug {
            tracing::debug!(
                event = event.name(),
                delivered = report.delivered,
                failed = report.failed,
                "event forwarded to clients"
            );
        }
        Ok(())
    }
}

fn to_system_event(notification: &ServerNotification) -> SystemEvent {
    let timestamp = Utc::now();
    match notification {
        ServerNotification::Connection {
            client_id,
            metadata,
            remote_address,
        } => SystemEvent::ClientConnected(ClientConnected {
            client_id: *client_id,
            metadata: metadata.clone(),
            remote_address: remote_address.clone(),
            timestamp,
        }),
        ServerNotification::Disconnection { client_id } => {
            SystemEvent::ClientDisconnected(ClientDisconnected {
                client_id: *client_id,
                timestamp,
            })
        }
        ServerNotification::Message {
            client_id,
            envelope,
        } => SystemEvent::ClientMessage(ClientMessage {
            client_id: *client_id,
            message_type: envelope.msg_type.clone(),
            data: envelope.data.clone(),
            timestamp,
        }),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::system_event::{CLIENT_CONNECTED, CLIENT_DISCONNECTED, CLIENT_MESSAGE};
    use crate::domain::{ConnectionId, Metadata, OutboundFrame};
    use crate::ws::server::WsServerConfig;
    use serde_json::json;
    use tokio::sync::mpsc;

    struct Fixture {
        bus: EventBus,
        server: Arc<WebSocketServer>,
        bridge: EventBridge,
    }

    fn fixture(exclusions: ExclusionSet) -> Fixture {
        let bus = EventBus::new();
        let server = Arc::new(WebSocketServer::new(WsServerConfig::default()));
        let bridge = EventBridge::attach(
            &bus,
            &server,
            BridgeOptions {
                exclusions,
                debug: true,
            },
        );
        Fixture {
            bus,
            server,
            bridge,
        }
    }

    fn connect(server: &WebSocketServer) -> (ConnectionId, mpsc::Receiver<OutboundFrame>) {
        let Some((conn, rx)) = server.accept("10.1.1.1:4242", Metadata::new()) else {
            panic!("server should accept");
        };
        (conn.id, rx)
    }

    fn record(bus: &EventBus, pattern: &str) -> Arc<Mutex<Vec<Event>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _ = bus.subscribe(pattern, move |e: &Event| {
            sink.lock().push(e.clone());
            Ok(())
        });
        seen
    }

    fn drain_texts(rx: &mut mpsc::Receiver<OutboundFrame>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            if let OutboundFrame::Text(text) = frame {
                out.push(text.to_string());
            }
        }
        out
    }

    #[test]
    fn forwards_bus_events_to_clients() {
        let fx = fixture(ExclusionSet::default());
        let (_id, mut rx) = connect(&fx.server);

        let _ = fx.bus.publish("orders.created", json!({ "id": "O1" }));

        let texts = drain_texts(&mut rx);
        assert!(texts.contains(&r#"{"type":"orders.created","data":{"id":"O1"}}"#.to_string()));
    }

    #[test]
    fn excluded_events_stay_in_process() {
        let fx = fixture(ExclusionSet::default());
        let audit = record(&fx.bus, "auth.loginFailed");
        let (_id, mut rx) = connect(&fx.server);
        let _ = drain_texts(&mut rx);

        let _ = fx.bus.publish("auth.loginFailed", json!({ "user": "cashier-3" }));

        assert!(drain_texts(&mut rx).is_empty());
        assert_eq!(audit.lock().len(), 1);
    }

    #[test]
    fn connect_and_disconnect_become_bus_events() {
        let fx = fixture(ExclusionSet::default());
        let connected = record(&fx.bus, CLIENT_CONNECTED);
        let disconnected = record(&fx.bus, CLIENT_DISCONNECTED);

        let (id, _rx) = connect(&fx.server);
        let _ = fx.server.disconnect(id);
        let _ = fx.server.disconnect(id);

        assert_eq!(connected.lock().len(), 1);
        let disconnected = disconnected.lock();
        assert_eq!(disconnected.len(), 1);
        let Some(Some(Ok(SystemEvent::ClientDisconnected(payload)))) =
            disconnected.first().map(SystemEvent::from_event)
        else {
            panic!("expected typed disconnect event");
        };
        assert_eq!(payload.client_id, id);
    }

    #[test]
    fn connected_subscriber_may_close_the_server() {
        let fx = fixture(ExclusionSet::default());
        let weak = Arc::downgrade(&fx.server);
        let _ = fx.bus.subscribe(CLIENT_CONNECTED, move |_: &Event| {
            if let Some(server) = weak.upgrade() {
                server.close();
            }
            Ok(())
        });

        let server = Arc::clone(&fx.server);
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let _worker = std::thread::spawn(move || {
            let accepted = server.accept("10.1.1.1:4243", Metadata::new()).is_some();
            let _ = done_tx.send(accepted);
        });

        let Ok(accepted) = done_rx.recv_timeout(std::time::Duration::from_secs(2)) else {
            panic!("accept blocked behind a subscriber that closed the server");
        };
        assert!(accepted);
        assert!(!fx.server.accepts_upgrades());
        assert_eq!(fx.server.client_count(), 0);
    }

    #[test]
    fn connection_event_is_broadcast_to_existing_clients() {
        let fx = fixture(ExclusionSet::empty());
        let (_a, mut rx_a) = connect(&fx.server);
        let _ = drain_texts(&mut rx_a);

        let (b, _rx_b) = connect(&fx.server);

        let texts = drain_texts(&mut rx_a);
        assert_eq!(texts.len(), 1);
        assert!(texts.iter().all(|t| t.contains(CLIENT_CONNECTED) && t.contains(&b.to_string())));
    }

    #[test]
    fn client_messages_are_republished_but_not_echoed() {
        let fx = fixture(ExclusionSet::default());
        let messages = record(&fx.bus, CLIENT_MESSAGE);
        let (id, mut rx) = connect(&fx.server);
        let _ = drain_texts(&mut rx);

        fx.server
            .handle_inbound(id, r#"{"type":"cart.scan","data":{"sku":"A1"}}"#);

        assert!(drain_texts(&mut rx).is_empty());
        let messages = messages.lock();
        let Some(event) = messages.first() else {
            panic!("expected a client message event");
        };
        assert_eq!(event.payload().get("type"), Some(&json!("cart.scan")));
    }

    #[test]
    fn detach_stops_both_directions() {
        let fx = fixture(ExclusionSet::empty());
        let connected = record(&fx.bus, CLIENT_CONNECTED);
        let (_a, mut rx) = connect(&fx.server);
        let _ = drain_texts(&mut rx);

        fx.bridge.detach();
        fx.bridge.detach();

        let _ = fx.bus.publish("orders.created", json!({}));
        let _ = connect(&fx.server);
        assert!(drain_texts(&mut rx).is_empty());
        assert_eq!(connected.lock().len(), 1);
    }
}
