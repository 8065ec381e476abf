//! # pos-realtime
//!
//! Real-time event bridge for the retail point-of-sale backend.
//!
//! Domain code anywhere in the process publishes named events on an
//! in-process [`domain::EventBus`]. The [`service::EventBridge`] forwards
//! every event that is not in its exclusion set to all connected
//! WebSocket clients, and republishes client connect/disconnect as
//! `system.*` bus events. The [`service::ServerLifecycleController`]
//! wires everything at startup and runs the graceful-shutdown protocol
//! on SIGINT/SIGTERM.
//!
//! ## Architecture
//!
//! ```text
//! Domain code ── publish ──► EventBus ──► EventBridge ──► WebSocketServer ──► clients
//!                               ▲              │                 │
//!                               └── system.* ◄─┘◄─ lifecycle ◄───┘
//!                                                        │
//!                                               ConnectionRegistry
//! ```
//!
//! ## Wire format
//!
//! Every frame in both directions is `{"type": "<name>", "data": <json>}`.

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod router;
pub mod service;
pub mod ws;
