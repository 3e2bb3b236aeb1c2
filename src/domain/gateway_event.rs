//! Notifications about device configuration and ingestion activity.
//!
//! Every device mutation and every finished ingestion pass emits a
//! [`GatewayEvent`] through the [`super::EventBus`]. Events are forwarded
//! to WebSocket subscribers so dashboards refresh without polling.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{Device, DeviceId, DeviceStatus};

/// Event emitted after a device change or an ingestion pass.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// A device was added to the directory.
    DeviceCreated {
        /// The new device.
        device: Device,
        /// Creation timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A device's configuration changed.
    DeviceUpdated {
        /// The device after the update.
        device: Device,
        /// Update timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A device was deleted.
    DeviceRemoved {
        /// Removed device id.
        device_id: DeviceId,
        /// Removal timestamp.
        timestamp: DateTime<Utc>,
    },

    /// An ingestion pass finished and wrote the device status.
    DeviceStatusChanged {
        /// Polled device.
        device_id: DeviceId,
        /// Status after the pass.
        status: DeviceStatus,
        /// When the pass finished.
        polled_at: DateTime<Utc>,
    },

    /// New attendance rows were appended for a device.
    LogsIngested {
        /// Polled device.
        device_id: DeviceId,
        /// Number of rows inserted.
        count: u64,
        /// Highest serial in the batch.
        max_sequence: i64,
        /// Insert timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl GatewayEvent {
    /// Returns the device this event concerns.
    #[must_use]
    pub fn device_id(&self) -> DeviceId {
        match self {
            Self::DeviceCreated { device, .. } | Self::DeviceUpdated { device, .. } => device.id,
            Self::DeviceRemoved { device_id, .. }
            | Self::DeviceStatusChanged { device_id, .. }
            | Self::LogsIngested { device_id, .. } => *device_id,
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::DeviceCreated { .. } => "device_created",
            Self::DeviceUpdated { .. } => "device_updated",
            Self::DeviceRemoved { .. } => "device_removed",
            Self::DeviceStatusChanged { .. } => "device_status_changed",
            Self::LogsIngested { .. } => "logs_ingested",
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn logs_ingested_serializes_with_tag() {
        let device_id = DeviceId::new();
        let event = GatewayEvent::LogsIngested {
            device_id,
            count: 2,
            max_sequence: 9,
            timestamp: Utc::now(),
        };
        let Ok(json) = serde_json::to_value(&event) else {
            panic!("serialization failed");
        };
        assert_eq!(json.get("event_type").and_then(|v| v.as_str()), Some("logs_ingested"));
        assert_eq!(json.get("max_sequence").and_then(|v| v.as_i64()), Some(9));
        assert_eq!(event.device_id(), device_id);
    }

    #[test]
    fn status_event_type() {
        let event = GatewayEvent::DeviceStatusChanged {
            device_id: DeviceId::new(),
            status: DeviceStatus::Offline,
            polled_at: Utc::now(),
        };
        assert_eq!(event.event_type_str(), "device_status_changed");
    }
}
