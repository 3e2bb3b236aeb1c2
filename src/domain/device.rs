//! Device configuration records and their polling state.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::DeviceId;

/// Last known reachability of a terminal, as recorded by the poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    /// The last pass connected and completed.
    Online,
    /// The last pass could not connect.
    Offline,
    /// The last pass connected but fetching or persisting failed.
    Error,
}

impl DeviceStatus {
    /// Returns the status as stored in the `devices.status` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Error => "error",
        }
    }

    /// Reads a stored status column. Anything unrecognized is `Error`.
    #[must_use]
    pub fn from_stored(value: &str) -> Self {
        match value {
            "online" => Self::Online,
            "offline" => Self::Offline,
            _ => Self::Error,
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Behavior profile of a terminal.
///
/// The role is configured explicitly per device and decides the event
/// type stamped on every entry ingested from it. It is never inferred
/// from the display name or from the raw record payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeviceRole {
    /// Terminal at the clock-in point.
    CheckIn,
    /// Terminal at the clock-out point.
    CheckOut,
    /// Door terminal recording entries.
    Entry,
    /// Door terminal recording exits.
    Exit,
}

impl DeviceRole {
    /// All roles, in catalog order.
    pub const ALL: [Self; 4] = [Self::CheckIn, Self::CheckOut, Self::Entry, Self::Exit];

    /// Event-type tag written to `attendance_logs.event_type`.
    #[must_use]
    pub const fn event_type(self) -> &'static str {
        match self {
            Self::CheckIn => "check_in",
            Self::CheckOut => "check_out",
            Self::Entry => "entry",
            Self::Exit => "exit",
        }
    }

    /// Short human description for the role catalog endpoint.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::CheckIn => "Clock-in terminal; entries are tagged check_in",
            Self::CheckOut => "Clock-out terminal; entries are tagged check_out",
            Self::Entry => "Door terminal on the way in; entries are tagged entry",
            Self::Exit => "Door terminal on the way out; entries are tagged exit",
        }
    }
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_type())
    }
}

/// Error returned when a string is not a known [`DeviceRole`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown device role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for DeviceRole {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|role| role.event_type() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

/// A configured attendance terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Device {
    /// Primary key.
    pub id: DeviceId,
    /// Display name shown in the dashboard.
    pub name: String,
    /// Host name or IP address of the terminal.
    pub ip_address: String,
    /// TCP port of the terminal.
    pub port: u16,
    /// Path the records are fetched from.
    pub api_endpoint: String,
    /// Polling is enabled only when this is set.
    pub is_active: bool,
    /// Behavior profile. Devices without one are not polled.
    pub role: Option<DeviceRole>,
    /// Status written by the last ingestion pass.
    pub status: DeviceStatus,
    /// When the last ingestion pass finished.
    pub last_poll_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last configuration change.
    pub updated_at: DateTime<Utc>,
}

impl Device {
    /// Returns the connection parameters of this device.
    #[must_use]
    pub fn endpoint(&self) -> DeviceEndpoint<'_> {
        DeviceEndpoint {
            address: &self.ip_address,
            port: self.port,
            path: &self.api_endpoint,
        }
    }
}

/// Borrowed connection parameters handed to a device client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceEndpoint<'a> {
    /// Host name or IP address.
    pub address: &'a str,
    /// TCP port.
    pub port: u16,
    /// Record path on the terminal.
    pub path: &'a str,
}

/// Validated input for creating a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDevice {
    /// Display name.
    pub name: String,
    /// Host name or IP address.
    pub ip_address: String,
    /// TCP port.
    pub port: u16,
    /// Record path on the terminal.
    pub api_endpoint: String,
    /// Whether polling is enabled.
    pub is_active: bool,
    /// Behavior profile.
    pub role: Option<DeviceRole>,
}

/// Partial update of a device's configuration. `None` leaves a field
/// untouched; `role: Some(None)` clears the role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DevicePatch {
    /// New display name.
    pub name: Option<String>,
    /// New address.
    pub ip_address: Option<String>,
    /// New port.
    pub port: Option<u16>,
    /// New record path.
    pub api_endpoint: Option<String>,
    /// New polling flag.
    pub is_active: Option<bool>,
    /// New role, or `Some(None)` to clear it.
    pub role: Option<Option<DeviceRole>>,
}

impl DevicePatch {
    /// Applies the patch to `device` and bumps `updated_at`.
    pub fn apply(&self, device: &mut Device, now: DateTime<Utc>) {
        if let Some(name) = &self.name {
            device.name.clone_from(name);
        }
        if let Some(ip_address) = &self.ip_address {
            device.ip_address.clone_from(ip_address);
        }
        if let Some(port) = self.port {
            device.port = port;
        }
        if let Some(api_endpoint) = &self.api_endpoint {
            device.api_endpoint.clone_from(api_endpoint);
        }
        if let Some(is_active) = self.is_active {
            device.is_active = is_active;
        }
        if let Some(role) = self.role {
            device.role = role;
        }
        device.updated_at = now;
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_event_type() {
        for role in DeviceRole::ALL {
            assert_eq!(role.event_type().parse::<DeviceRole>(), Ok(role));
        }
        assert!("Check-In".parse::<DeviceRole>().is_err());
    }

    #[test]
    fn unknown_stored_status_reads_as_error() {
        assert_eq!(DeviceStatus::from_stored("online"), DeviceStatus::Online);
        assert_eq!(DeviceStatus::from_stored("offline"), DeviceStatus::Offline);
        assert_eq!(DeviceStatus::from_stored("unknown"), DeviceStatus::Error);
    }

    #[test]
    fn patch_only_touches_given_fields() {
        let now = Utc::now();
        let mut device = Device {
            id: DeviceId::new(),
            name: "Lobby".to_string(),
            ip_address: "10.0.0.5".to_string(),
            port: 4370,
            api_endpoint: "/api/logs".to_string(),
            is_active: true,
            role: Some(DeviceRole::CheckIn),
            status: DeviceStatus::Offline,
            last_poll_at: None,
            created_at: now,
            updated_at: now,
        };
        let later = now + chrono::Duration::seconds(5);
        let patch = DevicePatch {
            port: Some(5005),
            role: Some(None),
            ..DevicePatch::default()
        };
        patch.apply(&mut device, later);

        assert_eq!(device.name, "Lobby");
        assert_eq!(device.port, 5005);
        assert_eq!(device.role, None);
        assert_eq!(device.updated_at, later);
    }
}
