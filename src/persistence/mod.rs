//! Persistence layer: device directory, attendance log, employee lookup.
//!
//! [`PostgresStore`] is the production backend (`sqlx::PgPool`);
//! [`InMemoryStore`] backs `PERSISTENCE_ENABLED=false` runs and tests.
//! [`Store`] picks one at startup and implements every store trait by
//! delegation, so the service layer and the poller stay concrete.

pub mod memory;
pub mod models;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

use std::collections::{BTreeSet, HashMap};
use std::future::Future;

use chrono::{DateTime, Utc};

use crate::domain::{AttendanceLog, Device, DeviceId, DevicePatch, DeviceStatus, NewDevice, NewLogEntry};
use crate::error::GatewayError;
use crate::service::ports::{DeviceDirectory, EmployeeDirectory, LogStore};

/// Maximum number of rows returned by the log view.
pub const MAX_LOG_LIMIT: u32 = 1000;

/// Rejects a batch holding entries for another device than the one its
/// watermark was read for.
pub(crate) fn ensure_single_device(
    device_id: DeviceId,
    entries: &[NewLogEntry],
) -> Result<(), GatewayError> {
    match entries.iter().find(|entry| entry.device_id != device_id) {
        Some(stray) => Err(GatewayError::InvalidRequest(format!(
            "batch for device {device_id} holds entry {} of device {}",
            stray.sequence, stray.device_id
        ))),
        None => Ok(()),
    }
}

/// Filter for the log view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogQuery {
    /// Maximum number of rows, newest first.
    pub limit: u32,
    /// Restrict to one device.
    pub device_id: Option<DeviceId>,
}

/// Device configuration CRUD and the read-only log view.
pub trait DeviceRepository: Send + Sync {
    /// Inserts a device. New devices start `offline` and unpolled.
    fn create_device(
        &self,
        input: NewDevice,
    ) -> impl Future<Output = Result<Device, GatewayError>> + Send;

    /// Returns one device.
    fn get_device(
        &self,
        device_id: DeviceId,
    ) -> impl Future<Output = Result<Option<Device>, GatewayError>> + Send;

    /// Returns every device, newest first.
    fn list_devices(&self) -> impl Future<Output = Result<Vec<Device>, GatewayError>> + Send;

    /// Applies a partial update, returning the device after the change.
    fn update_device(
        &self,
        device_id: DeviceId,
        patch: &DevicePatch,
    ) -> impl Future<Output = Result<Option<Device>, GatewayError>> + Send;

    /// Deletes a device and its logs. Returns `false` if it did not exist.
    fn delete_device(
        &self,
        device_id: DeviceId,
    ) -> impl Future<Output = Result<bool, GatewayError>> + Send;

    /// Returns stored logs, newest first.
    fn list_logs(
        &self,
        query: LogQuery,
    ) -> impl Future<Output = Result<Vec<AttendanceLog>, GatewayError>> + Send;
}

/// Backend selected at startup.
#[derive(Debug, Clone)]
pub enum Store {
    /// PostgreSQL via `sqlx`.
    Postgres(PostgresStore),
    /// Process-local maps.
    Memory(InMemoryStore),
}

impl DeviceRepository for Store {
    async fn create_device(&self, input: NewDevice) -> Result<Device, GatewayError> {
        match self {
            Self::Postgres(store) => store.create_device(input).await,
            Self::Memory(store) => store.create_device(input).await,
        }
    }

    async fn get_device(&self, device_id: DeviceId) -> Result<Option<Device>, GatewayError> {
        match self {
            Self::Postgres(store) => store.get_device(device_id).await,
            Self::Memory(store) => store.get_device(device_id).await,
        }
    }

    async fn list_devices(&self) -> Result<Vec<Device>, GatewayError> {
        match self {
            Self::Postgres(store) => store.list_devices().await,
            Self::Memory(store) => store.list_devices().await,
        }
    }

    async fn update_device(
        &self,
        device_id: DeviceId,
        patch: &DevicePatch,
    ) -> Result<Option<Device>, GatewayError> {
        match self {
            Self::Postgres(store) => store.update_device(device_id, patch).await,
            Self::Memory(store) => store.update_device(device_id, patch).await,
        }
    }

    async fn delete_device(&self, device_id: DeviceId) -> Result<bool, GatewayError> {
        match self {
            Self::Postgres(store) => store.delete_device(device_id).await,
            Self::Memory(store) => store.delete_device(device_id).await,
        }
    }

    async fn list_logs(&self, query: LogQuery) -> Result<Vec<AttendanceLog>, GatewayError> {
        match self {
            Self::Postgres(store) => store.list_logs(query).await,
            Self::Memory(store) => store.list_logs(query).await,
        }
    }
}

impl DeviceDirectory for Store {
    async fn list_enabled_devices(&self) -> Result<Vec<Device>, GatewayError> {
        match self {
            Self::Postgres(store) => store.list_enabled_devices().await,
            Self::Memory(store) => store.list_enabled_devices().await,
        }
    }

    async fn update_device_status(
        &self,
        device_id: DeviceId,
        status: DeviceStatus,
        polled_at: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        match self {
            Self::Postgres(store) => store.update_device_status(device_id, status, polled_at).await,
            Self::Memory(store) => store.update_device_status(device_id, status, polled_at).await,
        }
    }
}

impl LogStore for Store {
    async fn max_sequence_for(&self, device_id: DeviceId) -> Result<i64, GatewayError> {
        match self {
            Self::Postgres(store) => store.max_sequence_for(device_id).await,
            Self::Memory(store) => store.max_sequence_for(device_id).await,
        }
    }

    async fn append_batch(
        &self,
        device_id: DeviceId,
        entries: &[NewLogEntry],
    ) -> Result<u64, GatewayError> {
        match self {
            Self::Postgres(store) => store.append_batch(device_id, entries).await,
            Self::Memory(store) => store.append_batch(device_id, entries).await,
        }
    }
}

impl EmployeeDirectory for Store {
    async fn lookup_names(
        &self,
        ids: &BTreeSet<String>,
    ) -> Result<HashMap<String, String>, GatewayError> {
        match self {
            Self::Postgres(store) => store.lookup_names(ids).await,
            Self::Memory(store) => store.lookup_names(ids).await,
        }
    }
}
