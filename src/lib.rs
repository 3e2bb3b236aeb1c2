//! # attendance-gateway
//!
//! Collects attendance records from biometric terminals into PostgreSQL
//! and serves the device directory and the log view over REST and
//! WebSocket.
//!
//! A [`service::Poller`] visits every enabled device on a fixed interval.
//! For each one, an [`service::IngestionRoutine`] pass reads the
//! terminal's buffer, keeps records newer than the stored watermark,
//! attaches employee names and appends the batch. Failures are contained
//! per device and surface only as the device's status.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)          Terminals
//!     │                                  ▲
//!     ├── REST Handlers (api/)           │
//!     ├── WS Handler (ws/)               │
//!     │                                  │
//!     ├── DeviceService (service/)       │
//!     ├── Poller → IngestionRoutine ─────┤ device_client/
//!     ├── EventBus (domain/)             │
//!     │                                  │
//!     └── Store (persistence/): PostgreSQL or in-memory
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod device_client;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod service;
pub mod ws;
