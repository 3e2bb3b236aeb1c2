//! Database rows for devices and attendance logs.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    AcquisitionMethod, AttendanceLog, Device, DeviceId, DeviceRole, DeviceStatus, DeviceSummary,
};
use crate::error::GatewayError;

/// Column list matching [`DeviceRow`].
pub const DEVICE_COLUMNS: &str = "id, name, ip_address, port, api_endpoint, is_active, role, \
                                  status, last_poll_at, created_at, updated_at";

/// A row from the `devices` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DeviceRow {
    /// Primary key.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Address.
    pub ip_address: String,
    /// Port, stored as `INTEGER`.
    pub port: i32,
    /// Record path.
    pub api_endpoint: String,
    /// Polling flag.
    pub is_active: bool,
    /// Role tag; `NULL` when unassigned.
    pub role: Option<String>,
    /// Status tag.
    pub status: String,
    /// Last poll.
    pub last_poll_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DeviceRow> for Device {
    type Error = GatewayError;

    fn try_from(row: DeviceRow) -> Result<Self, Self::Error> {
        let port = u16::try_from(row.port).map_err(|_| {
            GatewayError::PersistenceError(format!("device {} has invalid port {}", row.id, row.port))
        })?;
        let role = match row.role.as_deref() {
            None => None,
            Some(tag) => match tag.parse::<DeviceRole>() {
                Ok(role) => Some(role),
                Err(err) => {
                    tracing::warn!(device_id = %row.id, %err, "ignoring unrecognized device role");
                    None
                }
            },
        };
        Ok(Self {
            id: DeviceId::from_uuid(row.id),
            name: row.name,
            ip_address: row.ip_address,
            port,
            api_endpoint: row.api_endpoint,
            is_active: row.is_active,
            role,
            status: DeviceStatus::from_stored(&row.status),
            last_poll_at: row.last_poll_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A row of the log view: `attendance_logs` left-joined with `devices`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LogRow {
    /// Row id.
    pub id: Uuid,
    /// Owning device.
    pub device_id: Uuid,
    /// Device-local user id.
    pub employee_id: String,
    /// Resolved name.
    pub employee_name: Option<String>,
    /// Terminal serial.
    pub user_sn: i64,
    /// Record timestamp.
    pub timestamp: DateTime<Utc>,
    /// Method tag.
    pub method: String,
    /// Event type tag.
    pub event_type: String,
    /// Raw record (`JSONB`).
    pub raw_data: serde_json::Value,
    /// Insert timestamp.
    pub created_at: DateTime<Utc>,
    /// Joined device name.
    pub device_name: Option<String>,
    /// Joined device address.
    pub device_ip_address: Option<String>,
}

impl From<LogRow> for AttendanceLog {
    fn from(row: LogRow) -> Self {
        let device_id = DeviceId::from_uuid(row.device_id);
        let device = match (row.device_name, row.device_ip_address) {
            (Some(name), Some(ip_address)) => Some(DeviceSummary {
                id: device_id,
                name,
                ip_address,
            }),
            _ => None,
        };
        Self {
            id: row.id,
            device_id,
            employee_id: row.employee_id,
            employee_name: row.employee_name,
            user_sn: row.user_sn,
            timestamp: row.timestamp,
            method: AcquisitionMethod::from_stored(&row.method),
            event_type: row.event_type,
            raw_data: row.raw_data,
            created_at: row.created_at,
            device,
        }
    }
}
