//! Live WebSocket connection identity, metadata, and outbound handle.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio::sync::{Notify, mpsc};

use crate::error::BridgeError;

/// Arbitrary per-connection tags (query parameters, user agent, ...).
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Opaque identifier of a WebSocket connection.
///
/// Issued from a monotonically increasing counter owned by the
/// [`super::ConnectionRegistry`], so an id is never handed out twice for
/// the lifetime of the registry. Serialized as `"conn-<n>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wraps a raw sequence number.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw sequence number.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

impl FromStr for ConnectionId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix("conn-")
            .and_then(|n| n.parse().ok())
            .map(Self)
            .ok_or_else(|| format!("invalid connection id: {s}"))
    }
}

impl Serialize for ConnectionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ConnectionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A frame queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Serialized envelope, shared across all recipients of a broadcast.
    Text(Arc<str>),
    /// Server-initiated close. The writer sends it after every frame
    /// already queued and then stops.
    Close {
        /// WebSocket close code.
        code: u16,
        /// Close reason sent to the peer.
        reason: &'static str,
    },
}

/// Sending half of a connection's bounded outbound queue, plus the
/// close signal its writer task waits on.
///
/// The receiving half belongs to the connection's writer task, which
/// owns the socket sink.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    tx: mpsc::Sender<OutboundFrame>,
    closing: Arc<Notify>,
}

impl ConnectionHandle {
    /// Creates a handle and its receiver with room for `capacity` frames.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let closing = Arc::new(Notify::new());
        (Self { tx, closing }, rx)
    }

    /// Returns `true` once the writer task has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A registered WebSocket connection.
///
/// Owned by the [`super::ConnectionRegistry`]; snapshots hand out clones,
/// which share the same outbound queue.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Registry-issued id.
    pub id: ConnectionId,
    /// Peer address as seen by the listener.
    pub remote_address: String,
    /// Tags attached at upgrade time or later via the registry.
    pub metadata: Metadata,
    /// Time the upgrade completed.
    pub connected_at: DateTime<Utc>,
    pub(crate) handle: ConnectionHandle,
}

impl Connection {
    /// Queues a frame without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Backpressure`] if the outbound queue is
    /// full, or [`BridgeError::ConnectionClosed`] if the writer is gone.
    pub fn try_send(&self, frame: OutboundFrame) -> Result<(), BridgeError> {
        self.handle.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => BridgeError::Backpressure(self.id),
            mpsc::error::TrySendError::Closed(_) => BridgeError::ConnectionClosed(self.id),
        })
    }

    /// Asks the writer task to close the socket once its queue is drained.
    ///
    /// Unlike a queued [`OutboundFrame::Close`], the request is kept even
    /// when the queue is full.
    pub fn request_close(&self) {
        self.handle.closing.notify_one();
    }

    /// The signal [`Connection::request_close`] fires; awaited by the
    /// writer task.
    #[must_use]
    pub fn close_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.handle.closing)
    }
}
