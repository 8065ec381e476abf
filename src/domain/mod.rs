//! Domain layer: events, the event bus, and the connection directory.
//!
//! This module holds the transport-independent core: the immutable
//! [`Event`] value and its typed `system.*` registry, name patterns and
//! the outbound exclusion set, the in-process [`EventBus`], and the
//! [`ConnectionRegistry`] that owns every live WebSocket connection.

pub mod connection;
pub mod connection_registry;
pub mod event;
pub mod event_bus;
pub mod event_pattern;
pub mod system_event;

pub use connection::{Connection, ConnectionHandle, ConnectionId, Metadata, OutboundFrame};
pub use connection_registry::ConnectionRegistry;
pub use event::Event;
pub use event_bus::{EventBus, EventHandler, SubscriptionHandle};
pub use event_pattern::{EventPattern, ExclusionSet};
pub use system_event::SystemEvent;
