//! Typed payloads for the `system.*` event names.
//!
//! Application events carry opaque JSON. The names the bridge and the
//! lifecycle controller publish themselves have a fixed shape, described
//! here as a tagged union so consumers can match on them instead of
//! poking at raw JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::connection::{ConnectionId, Metadata};
use super::event::Event;

/// Published once the server is running.
pub const SERVER_STARTED: &str = "system.serverStarted";
/// Published when graceful shutdown begins.
pub const SERVER_STOPPING: &str = "system.serverStopping";
/// Published after a WebSocket upgrade completes.
pub const CLIENT_CONNECTED: &str = "system.clientConnected";
/// Published exactly once per connection when it goes away.
pub const CLIENT_DISCONNECTED: &str = "system.clientDisconnected";
/// Published for every well-formed inbound client message.
pub const CLIENT_MESSAGE: &str = "system.clientMessage";
/// Wire message sent to clients right before the server closes them.
pub const SHUTDOWN_NOTICE: &str = "system:shutdown";

/// Payload of [`SERVER_STARTED`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStarted {
    /// Deployment environment tag (`APP_ENV`).
    pub environment: String,
    /// Start time.
    pub timestamp: DateTime<Utc>,
}

/// Payload of [`SERVER_STOPPING`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStopping {
    /// Deployment environment tag.
    pub environment: String,
    /// Clients connected when shutdown began.
    pub clients: usize,
    /// Time shutdown began.
    pub timestamp: DateTime<Utc>,
}

/// Payload of [`CLIENT_CONNECTED`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConnected {
    /// Id of the new connection.
    pub client_id: ConnectionId,
    /// Upgrade-time metadata.
    pub metadata: Metadata,
    /// Peer address.
    pub remote_address: String,
    /// Connect time.
    pub timestamp: DateTime<Utc>,
}

/// Payload of [`CLIENT_DISCONNECTED`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDisconnected {
    /// Id of the departed connection.
    pub client_id: ConnectionId,
    /// Disconnect time.
    pub timestamp: DateTime<Utc>,
}

/// Payload of [`CLIENT_MESSAGE`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMessage {
    /// Sender.
    pub client_id: ConnectionId,
    /// The envelope's `type`.
    #[serde(rename = "type")]
    pub message_type: String,
    /// The envelope's `data`.
    pub data: serde_json::Value,
    /// Receive time.
    pub timestamp: DateTime<Utc>,
}

/// Payload of the [`SHUTDOWN_NOTICE`] wire message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShutdownNotice {
    /// Human-readable explanation.
    pub message: String,
    /// Time the notice was sent.
    pub timestamp: DateTime<Utc>,
}

/// Every event the bridge itself puts on the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum SystemEvent {
    /// See [`SERVER_STARTED`].
    ServerStarted(ServerStarted),
    /// See [`SERVER_STOPPING`].
    ServerStopping(ServerStopping),
    /// See [`CLIENT_CONNECTED`].
    ClientConnected(ClientConnected),
    /// See [`CLIENT_DISCONNECTED`].
    ClientDisconnected(ClientDisconnected),
    /// See [`CLIENT_MESSAGE`].
    ClientMessage(ClientMessage),
}

impl SystemEvent {
    /// Event name this variant is published under.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ServerStarted(_) => SERVER_STARTED,
            Self::ServerStopping(_) => SERVER_STOPPING,
            Self::ClientConnected(_) => CLIENT_CONNECTED,
            Self::ClientDisconnected(_) => CLIENT_DISCONNECTED,
            Self::ClientMessage(_) => CLIENT_MESSAGE,
        }
    }

    /// Builds the bus event for this variant.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if the payload cannot be encoded
    /// (metadata values are already JSON, so this does not happen in
    /// practice).
    pub fn to_event(&self) -> Result<Event, serde_json::Error> {
        match self {
            Self::ServerStarted(p) => Event::from_payload(self.name(), p),
            Self::ServerStopping(p) => Event::from_payload(self.name(), p),
            Self::ClientConnected(p) => Event::from_payload(self.name(), p),
            Self::ClientDisconnected(p) => Event::from_payload(self.name(), p),
            Self::ClientMessage(p) => Event::from_payload(self.name(), p),
        }
    }

    /// Decodes a bus event into its typed form.
    ///
    /// Returns `None` for names outside the `system.*` registry, and
    /// `Some(Err(..))` if a known name carries a payload of the wrong
    /// shape.
    #[must_use]
    pub fn from_event(event: &Event) -> Option<Result<Self, serde_json::Error>> {
        let decoded = match event.name() {
            SERVER_STARTED => event.decode().map(Self::ServerStarted),
            SERVER_STOPPING => event.decode().map(Self::ServerStopping),
            CLIENT_CONNECTED => event.decode().map(Self::ClientConnected),
            CLIENT_DISCONNECTED => event.decode().map(Self::ClientDisconnected),
            CLIENT_MESSAGE => event.decode().map(Self::ClientMessage),
            _ => return None,
        };
        Some(decoded)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn client_connected_uses_camel_case() {
        let event = SystemEvent::ClientConnected(ClientConnected {
            client_id: ConnectionId::from_raw(9),
            metadata: Metadata::new(),
            remote_address: "10.0.0.5:51000".to_string(),
            timestamp: Utc::now(),
        });
        let Ok(bus_event) = event.to_event() else {
            panic!("system event should encode");
        };
        assert_eq!(bus_event.name(), CLIENT_CONNECTED);
        let payload = bus_event.payload();
        assert_eq!(
            payload.get("clientId"),
            Some(&serde_json::json!("conn-9"))
        );
        assert!(payload.get("remoteAddress").is_some());
    }

    #[test]
    fn from_event_round_trips_known_names() {
        let original = SystemEvent::ClientDisconnected(ClientDisconnected {
            client_id: ConnectionId::from_raw(4),
            timestamp: Utc::now(),
        });
        let Ok(bus_event) = original.to_event() else {
            panic!("system event should encode");
        };
        let Some(Ok(decoded)) = SystemEvent::from_event(&bus_event) else {
            panic!("known name should decode");
        };
        assert_eq!(decoded, original);
    }

    #[test]
    fn from_event_ignores_application_names() {
        let event = Event::new("orders.created", serde_json::json!({ "id": "O1" }));
        assert!(SystemEvent::from_event(&event).is_none());
    }

    #[test]
    fn from_event_reports_malformed_payload() {
        let event = Event::new(CLIENT_DISCONNECTED, serde_json::json!({ "clientId": 5 }));
        assert!(matches!(SystemEvent::from_event(&event), Some(Err(_))));
    }
}
