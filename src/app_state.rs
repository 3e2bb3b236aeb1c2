//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::domain::EventBus;
use crate::persistence::Store;
use crate::service::DeviceService;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Device configuration and log view.
    pub device_service: Arc<DeviceService<Store>>,
    /// Event bus for WebSocket subscriptions.
    pub event_bus: EventBus,
}
