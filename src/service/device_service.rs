//! Device service: validates device configuration and emits events.

use chrono::Utc;

use crate::domain::{AttendanceLog, Device, DeviceId, DevicePatch, EventBus, GatewayEvent, NewDevice};
use crate::error::GatewayError;
use crate::persistence::{DeviceRepository, LogQuery, MAX_LOG_LIMIT};

/// Rows returned by the log view when no limit is given.
pub const DEFAULT_LOG_LIMIT: u32 = 100;

const MAX_NAME_LEN: usize = 100;
const MAX_ADDRESS_LEN: usize = 253;

/// Values applied to fields a create request leaves out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDefaults {
    /// Port used when none is given.
    pub port: u16,
    /// Fetch path used when none is given.
    pub api_endpoint: String,
}

impl Default for DeviceDefaults {
    fn default() -> Self {
        Self {
            port: 4370,
            api_endpoint: "/api/logs".to_string(),
        }
    }
}

/// Orchestration layer for device configuration and the log view.
///
/// Every mutation follows the pattern: validate → write through the
/// repository → emit an event → return the stored device.
#[derive(Debug, Clone)]
pub struct DeviceService<R> {
    repository: R,
    event_bus: EventBus,
    defaults: DeviceDefaults,
}

impl<R: DeviceRepository> DeviceService<R> {
    /// Creates a new `DeviceService`.
    #[must_use]
    pub fn new(repository: R, event_bus: EventBus, defaults: DeviceDefaults) -> Self {
        Self {
            repository,
            event_bus,
            defaults,
        }
    }

    /// Returns a reference to the inner [`EventBus`].
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Defaults for omitted create fields.
    #[must_use]
    pub fn defaults(&self) -> &DeviceDefaults {
        &self.defaults
    }

    /// Registers a device.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] if a field is blank or
    /// malformed, or a persistence error.
    pub async fn create_device(&self, input: NewDevice) -> Result<Device, GatewayError> {
        let input = NewDevice {
            name: normalize_name(&input.name)?,
            ip_address: normalize_address(&input.ip_address)?,
            port: validate_port(input.port)?,
            api_endpoint: normalize_endpoint(&input.api_endpoint)?,
            is_active: input.is_active,
            role: input.role,
        };
        let device = self.repository.create_device(input).await?;

        let _ = self.event_bus.publish(GatewayEvent::DeviceCreated {
            device: device.clone(),
            timestamp: Utc::now(),
        });
        tracing::info!(device_id = %device.id, device = %device.name, "device created");
        Ok(device)
    }

    /// Returns one device.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::DeviceNotFound`] for an unknown id.
    pub async fn get_device(&self, device_id: DeviceId) -> Result<Device, GatewayError> {
        self.repository
            .get_device(device_id)
            .await?
            .ok_or(GatewayError::DeviceNotFound(device_id.into()))
    }

    /// Returns every device, newest first.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if the listing fails.
    pub async fn list_devices(&self) -> Result<Vec<Device>, GatewayError> {
        self.repository.list_devices().await
    }

    /// Applies a partial update.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] for a malformed field and
    /// [`GatewayError::DeviceNotFound`] for an unknown id.
    pub async fn update_device(
        &self,
        device_id: DeviceId,
        patch: DevicePatch,
    ) -> Result<Device, GatewayError> {
        let patch = DevicePatch {
            name: patch.name.as_deref().map(normalize_name).transpose()?,
            ip_address: patch.ip_address.as_deref().map(normalize_address).transpose()?,
            port: patch.port.map(validate_port).transpose()?,
            api_endpoint: patch.api_endpoint.as_deref().map(normalize_endpoint).transpose()?,
            is_active: patch.is_active,
            role: patch.role,
        };
        let device = self
            .repository
            .update_device(device_id, &patch)
            .await?
            .ok_or(GatewayError::DeviceNotFound(device_id.into()))?;

        let _ = self.event_bus.publish(GatewayEvent::DeviceUpdated {
            device: device.clone(),
            timestamp: Utc::now(),
        });
        tracing::info!(device_id = %device.id, device = %device.name, "device updated");
        Ok(device)
    }

    /// Deletes a device and its logs.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::DeviceNotFound`] for an unknown id.
    pub async fn delete_device(&self, device_id: DeviceId) -> Result<(), GatewayError> {
        if !self.repository.delete_device(device_id).await? {
            return Err(GatewayError::DeviceNotFound(device_id.into()));
        }

        let _ = self.event_bus.publish(GatewayEvent::DeviceRemoved {
            device_id,
            timestamp: Utc::now(),
        });
        tracing::info!(%device_id, "device removed");
        Ok(())
    }

    /// Returns the newest logs. `limit` defaults to [`DEFAULT_LOG_LIMIT`]
    /// and is clamped to `1..=MAX_LOG_LIMIT`.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if the query fails.
    pub async fn list_logs(
        &self,
        limit: Option<u32>,
        device_id: Option<DeviceId>,
    ) -> Result<Vec<AttendanceLog>, GatewayError> {
        let limit = limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT);
        self.repository.list_logs(LogQuery { limit, device_id }).await
    }
}

fn normalize_name(name: &str) -> Result<String, GatewayError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(GatewayError::InvalidRequest("name is required".to_string()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(GatewayError::InvalidRequest(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

fn normalize_address(address: &str) -> Result<String, GatewayError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(GatewayError::InvalidRequest("ip_address is required".to_string()));
    }
    if address.len() > MAX_ADDRESS_LEN || address.chars().any(char::is_whitespace) {
        return Err(GatewayError::InvalidRequest(format!(
            "ip_address is not a valid host: {address:?}"
        )));
    }
    Ok(address.to_string())
}

fn validate_port(port: u16) -> Result<u16, GatewayError> {
    if port == 0 {
        return Err(GatewayError::InvalidRequest("port must be between 1 and 65535".to_string()));
    }
    Ok(port)
}

fn normalize_endpoint(endpoint: &str) -> Result<String, GatewayError> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return Err(GatewayError::InvalidRequest("api_endpoint must not be blank".to_string()));
    }
    if endpoint.chars().any(char::is_whitespace) {
        return Err(GatewayError::InvalidRequest(format!(
            "api_endpoint must not contain whitespace: {endpoint:?}"
        )));
    }
    if endpoint.starts_with('/') {
        Ok(endpoint.to_string())
    } else {
        Ok(format!("/{endpoint}"))
    }
}
