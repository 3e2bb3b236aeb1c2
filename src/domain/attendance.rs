//! Attendance records as read from terminals and as stored in the log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{DeviceId, DeviceRole};

/// How the employee identified themselves at the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionMethod {
    /// RFID or magnetic card.
    Card,
    /// Fingerprint scan.
    Fingerprint,
    /// Face recognition.
    Face,
    /// Keypad PIN.
    Pin,
    /// Anything else.
    Other,
}

impl AcquisitionMethod {
    /// Returns the tag stored in `attendance_logs.method`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Card => "card",
            Self::Fingerprint => "fingerprint",
            Self::Face => "face",
            Self::Pin => "pin",
            Self::Other => "other",
        }
    }

    /// Reads a stored tag. Unrecognized tags map to `Other`.
    #[must_use]
    pub fn from_stored(value: &str) -> Self {
        match value {
            "card" => Self::Card,
            "fingerprint" => Self::Fingerprint,
            "face" => Self::Face,
            "pin" => Self::Pin,
            _ => Self::Other,
        }
    }
}

/// One record from a terminal's attendance buffer.
///
/// Lives only for the duration of an ingestion pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAttendanceRecord {
    /// Device-local user id, stringified.
    pub user_id: String,
    /// Serial assigned by the terminal; unique and increasing per device.
    pub sequence: i64,
    /// When the terminal recorded the event.
    pub recorded_at: DateTime<Utc>,
    /// The record exactly as the terminal returned it.
    pub payload: serde_json::Value,
}

/// A log entry ready to be appended to the log store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLogEntry {
    /// Terminal the record came from.
    pub device_id: DeviceId,
    /// Device-local user id, stringified.
    pub employee_id: String,
    /// Name resolved at ingestion time; `None` when no employee matched.
    pub employee_name: Option<String>,
    /// Terminal serial of the record.
    pub sequence: i64,
    /// Original record timestamp.
    pub recorded_at: DateTime<Utc>,
    /// Acquisition method tag.
    pub method: AcquisitionMethod,
    /// Event type, taken from the device role.
    pub event_type: DeviceRole,
    /// Raw record kept for audit.
    pub raw_data: serde_json::Value,
}

/// Short device description joined into the log view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DeviceSummary {
    /// Device id.
    pub id: DeviceId,
    /// Display name.
    pub name: String,
    /// Address.
    pub ip_address: String,
}

/// A stored attendance log row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AttendanceLog {
    /// Row id.
    pub id: Uuid,
    /// Terminal the record came from.
    pub device_id: DeviceId,
    /// Device-local user id.
    pub employee_id: String,
    /// Resolved name, or `null` when no employee matched at ingestion.
    pub employee_name: Option<String>,
    /// Terminal serial.
    pub user_sn: i64,
    /// Original record timestamp.
    pub timestamp: DateTime<Utc>,
    /// Acquisition method tag.
    pub method: AcquisitionMethod,
    /// Event type tag (`check_in`, `check_out`, `entry`, `exit`). Kept as
    /// text so rows written with other tags remain readable.
    pub event_type: String,
    /// Raw record.
    #[schema(value_type = Object)]
    pub raw_data: serde_json::Value,
    /// Insert timestamp.
    pub created_at: DateTime<Utc>,
    /// Owning device, when it still exists.
    #[serde(rename = "devices", skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceSummary>,
}

/// A row of the employee directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Employee {
    /// Employee id, matching the device-local user id.
    pub id: String,
    /// Display name.
    pub name: String,
}
