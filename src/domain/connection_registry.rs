//! Authoritative directory of live WebSocket connections.
//!
//! [`ConnectionRegistry`] keeps every live [`Connection`] in a `HashMap`
//! behind a single [`parking_lot::Mutex`]. Registration, removal and
//! snapshotting take the lock briefly; callers iterate the snapshot
//! without holding it, so a broadcast never blocks a concurrent
//! connect or disconnect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::Mutex;

use super::connection::{Connection, ConnectionHandle, ConnectionId, Metadata};

/// Central store for all live connections.
///
/// # Concurrency
///
/// - `register`, `unregister`, `tag` and `all` are mutually exclusive.
/// - `all` returns a point-in-time copy; later changes are not visible
///   through it.
/// - Ids come from an atomic counter and are never reused.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<ConnectionId, Connection>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Stores a new connection under a freshly issued id and returns it.
    pub fn register(
        &self,
        handle: ConnectionHandle,
        remote_address: impl Into<String>,
        metadata: Metadata,
    ) -> Connection {
        let id = ConnectionId::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed));
        let connection = Connection {
            id,
            remote_address: remote_address.into(),
            metadata,
            connected_at: Utc::now(),
            handle,
        };
        self.connections.lock().insert(id, connection.clone());
        connection
    }

    /// Removes a connection, returning it if it was still present.
    ///
    /// Only the first call for a given id returns `Some`; the caller that
    /// receives it owns the disconnect notification.
    pub fn unregister(&self, id: ConnectionId) -> Option<Connection> {
        self.connections.lock().remove(&id)
    }

    /// Returns a copy of the connection with the given id.
    #[must_use]
    pub fn get(&self, id: ConnectionId) -> Option<Connection> {
        self.connections.lock().get(&id).cloned()
    }

    /// Adds or replaces a metadata tag. Returns `false` if the connection
    /// is gone.
    pub fn tag(&self, id: ConnectionId, key: impl Into<String>, value: serde_json::Value) -> bool {
        match self.connections.lock().get_mut(&id) {
            Some(connection) => {
                connection.metadata.insert(key.into(), value);
                true
            }
            None => false,
        }
    }

    /// Point-in-time snapshot of every live connection, ordered by id.
    #[must_use]
    pub fn all(&self) -> Vec<Connection> {
        let mut snapshot: Vec<Connection> = self.connections.lock().values().cloned().collect();
        snapshot.sort_by_key(|c| c.id);
        snapshot
    }

    /// Number of live connections.
    #[must_use]
    pub fn count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Returns `true` if no connection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
