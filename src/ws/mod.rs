//! WebSocket layer: connection handling, message routing, subscriptions.
//!
//! The endpoint at `/ws` pushes device and ingestion events to dashboards.
//! Clients pick devices with `subscribe`/`unsubscribe` commands and can
//! read a device's current state with `get_device`.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod subscription;
