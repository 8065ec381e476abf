//! Service layer: the event bridge and the process lifecycle controller.
//!
//! [`EventBridge`] connects the [`crate::domain::EventBus`] to the
//! [`crate::ws::WebSocketServer`] in both directions.
//! [`ServerLifecycleController`] wires the two at startup and runs the
//! graceful-shutdown protocol.

pub mod event_bridge;
pub mod lifecycle;

pub use event_bridge::{BridgeOptions, EventBridge};
pub use lifecycle::{HealthSnapshot, LifecycleState, ServerLifecycleController};
