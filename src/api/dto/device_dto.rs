//! Device DTOs for create, update, and the role catalog.

use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

use crate::domain::{DevicePatch, DeviceRole, NewDevice};
use crate::service::DeviceDefaults;

/// Request body for `POST /api/devices`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateDeviceRequest {
    /// Display name (max 100 chars).
    pub name: String,
    /// Terminal host or IP address.
    pub ip_address: String,
    /// Terminal port. Defaults to 4370.
    #[serde(default)]
    pub port: Option<u16>,
    /// Path of the records endpoint. Defaults to `/api/logs`.
    #[serde(default)]
    pub api_endpoint: Option<String>,
    /// Whether the poller visits this device. Defaults to `true`.
    #[serde(default)]
    pub is_active: Option<bool>,
    /// Event type stamped on this device's records.
    #[serde(default)]
    pub role: Option<DeviceRole>,
}

impl CreateDeviceRequest {
    /// Fills omitted fields from `defaults`.
    #[must_use]
    pub fn into_new_device(self, defaults: &DeviceDefaults) -> NewDevice {
        NewDevice {
            name: self.name,
            ip_address: self.ip_address,
            port: self.port.unwrap_or(defaults.port),
            api_endpoint: self
                .api_endpoint
                .unwrap_or_else(|| defaults.api_endpoint.clone()),
            is_active: self.is_active.unwrap_or(true),
            role: self.role,
        }
    }
}

/// Request body for `PUT /api/devices/{id}`. Absent fields are left
/// unchanged; `"role": null` clears the role.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateDeviceRequest {
    /// New display name.
    #[serde(default)]
    pub name: Option<String>,
    /// New host or IP address.
    #[serde(default)]
    pub ip_address: Option<String>,
    /// New port.
    #[serde(default)]
    pub port: Option<u16>,
    /// New records endpoint path.
    #[serde(default)]
    pub api_endpoint: Option<String>,
    /// Enables or disables polling.
    #[serde(default)]
    pub is_active: Option<bool>,
    /// New role, or `null` to clear it.
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<DeviceRole>)]
    pub role: Option<Option<DeviceRole>>,
}

impl From<UpdateDeviceRequest> for DevicePatch {
    fn from(req: UpdateDeviceRequest) -> Self {
        Self {
            name: req.name,
            ip_address: req.ip_address,
            port: req.port,
            api_endpoint: req.api_endpoint,
            is_active: req.is_active,
            role: req.role,
        }
    }
}

/// Distinguishes an explicit `null` from an absent field.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Role catalog entry for `GET /config/device-roles`.
#[derive(Debug, Serialize, ToSchema)]
pub struct DeviceRoleInfo {
    /// Role identifier, also the stored event type.
    pub role: DeviceRole,
    /// Human-readable description.
    pub description: &'static str,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn create_request_applies_defaults() {
        let Ok(req) = serde_json::from_str::<CreateDeviceRequest>(
            r#"{"name":"Gate","ip_address":"192.168.1.20"}"#,
        ) else {
            panic!("valid request");
        };
        let device = req.into_new_device(&DeviceDefaults::default());
        assert_eq!(device.port, 4370);
        assert_eq!(device.api_endpoint, "/api/logs");
        assert!(device.is_active);
        assert_eq!(device.role, None);
    }

    #[test]
    fn update_request_distinguishes_null_from_absent() {
        let Ok(absent) = serde_json::from_str::<UpdateDeviceRequest>(r#"{"port":4371}"#) else {
            panic!("valid request");
        };
        assert_eq!(absent.role, None);

        let Ok(cleared) = serde_json::from_str::<UpdateDeviceRequest>(r#"{"role":null}"#) else {
            panic!("valid request");
        };
        assert_eq!(cleared.role, Some(None));

        let Ok(set) = serde_json::from_str::<UpdateDeviceRequest>(r#"{"role":"exit"}"#) else {
            panic!("valid request");
        };
        assert_eq!(set.role, Some(Some(DeviceRole::Exit)));
    }

    #[test]
    fn unknown_role_is_rejected() {
        assert!(serde_json::from_str::<CreateDeviceRequest>(
            r#"{"name":"Gate","ip_address":"10.0.0.1","role":"lunch"}"#
        )
        .is_err());
    }
}
