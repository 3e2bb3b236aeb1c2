//! Shared DTO types used across multiple endpoints.

use serde::Deserialize;
use utoipa::IntoParams;

use crate::domain::DeviceId;

/// Query parameters for `GET /api/logs`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LogQueryParams {
    /// Maximum rows, newest first. Defaults to 100, clamped to 1..=1000.
    pub limit: Option<u32>,
    /// Only logs from this device.
    pub device_id: Option<uuid::Uuid>,
}

impl LogQueryParams {
    /// The device filter as a typed id.
    #[must_use]
    pub fn device_id(&self) -> Option<DeviceId> {
        self.device_id.map(DeviceId::from_uuid)
    }
}
