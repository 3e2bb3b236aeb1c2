//! Process-local store.
//!
//! Mirrors the PostgreSQL schema closely enough for the service and the
//! poller to behave identically: newest-first listings, per-device
//! `(device_id, user_sn)` uniqueness, and log cascade on device delete.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{DeviceRepository, LogQuery, ensure_single_device};
use crate::domain::{
    AttendanceLog, Device, DeviceId, DevicePatch, DeviceStatus, DeviceSummary, Employee,
    NewDevice, NewLogEntry,
};
use crate::error::GatewayError;
use crate::service::ports::{DeviceDirectory, EmployeeDirectory, LogStore};

#[derive(Debug, Default)]
struct MemoryState {
    devices: HashMap<DeviceId, Device>,
    logs: Vec<AttendanceLog>,
    employees: HashMap<String, String>,
}

/// In-memory implementation of every store trait.
///
/// Cloning is cheap; clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or renames an employee.
    pub async fn upsert_employee(&self, employee: Employee) {
        let mut state = self.state.write().await;
        state.employees.insert(employee.id, employee.name);
    }

    /// Returns the stored logs of one device ordered by serial.
    pub async fn logs_for(&self, device_id: DeviceId) -> Vec<AttendanceLog> {
        let state = self.state.read().await;
        let mut logs: Vec<AttendanceLog> = state
            .logs
            .iter()
            .filter(|log| log.device_id == device_id)
            .cloned()
            .collect();
        logs.sort_by_key(|log| log.user_sn);
        logs
    }
}

impl DeviceRepository for InMemoryStore {
    async fn create_device(&self, input: NewDevice) -> Result<Device, GatewayError> {
        let now = Utc::now();
        let device = Device {
            id: DeviceId::new(),
            name: input.name,
            ip_address: input.ip_address,
            port: input.port,
            api_endpoint: input.api_endpoint,
            is_active: input.is_active,
            role: input.role,
            status: DeviceStatus::Offline,
            last_poll_at: None,
            created_at: now,
            updated_at: now,
        };
        let mut state = self.state.write().await;
        state.devices.insert(device.id, device.clone());
        Ok(device)
    }

    async fn get_device(&self, device_id: DeviceId) -> Result<Option<Device>, GatewayError> {
        Ok(self.state.read().await.devices.get(&device_id).cloned())
    }

    async fn list_devices(&self) -> Result<Vec<Device>, GatewayError> {
        let state = self.state.read().await;
        let mut devices: Vec<Device> = state.devices.values().cloned().collect();
        devices.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(devices)
    }

    async fn update_device(
        &self,
        device_id: DeviceId,
        patch: &DevicePatch,
    ) -> Result<Option<Device>, GatewayError> {
        let mut state = self.state.write().await;
        Ok(state.devices.get_mut(&device_id).map(|device| {
            patch.apply(device, Utc::now());
            device.clone()
        }))
    }

    async fn delete_device(&self, device_id: DeviceId) -> Result<bool, GatewayError> {
        let mut state = self.state.write().await;
        let existed = state.devices.remove(&device_id).is_some();
        if existed {
            state.logs.retain(|log| log.device_id != device_id);
        }
        Ok(existed)
    }

    async fn list_logs(&self, query: LogQuery) -> Result<Vec<AttendanceLog>, GatewayError> {
        let state = self.state.read().await;
        let mut logs: Vec<AttendanceLog> = state
            .logs
            .iter()
            .filter(|log| query.device_id.is_none_or(|id| log.device_id == id))
            .cloned()
            .map(|mut log| {
                log.device = state.devices.get(&log.device_id).map(|d| DeviceSummary {
                    id: d.id,
                    name: d.name.clone(),
                    ip_address: d.ip_address.clone(),
                });
                log
            })
            .collect();
        logs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        logs.truncate(usize::try_from(query.limit).unwrap_or(usize::MAX));
        Ok(logs)
    }
}

impl DeviceDirectory for InMemoryStore {
    async fn list_enabled_devices(&self) -> Result<Vec<Device>, GatewayError> {
        let state = self.state.read().await;
        let mut devices: Vec<Device> = state
            .devices
            .values()
            .filter(|d| d.is_active)
            .cloned()
            .collect();
        devices.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(devices)
    }

    async fn update_device_status(
        &self,
        device_id: DeviceId,
        status: DeviceStatus,
        polled_at: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        let mut state = self.state.write().await;
        if let Some(device) = state.devices.get_mut(&device_id) {
            device.status = status;
            device.last_poll_at = Some(polled_at);
        }
        Ok(())
    }
}

impl LogStore for InMemoryStore {
    async fn max_sequence_for(&self, device_id: DeviceId) -> Result<i64, GatewayError> {
        let state = self.state.read().await;
        Ok(state
            .logs
            .iter()
            .filter(|log| log.device_id == device_id)
            .map(|log| log.user_sn)
            .max()
            .unwrap_or(0))
    }

    async fn append_batch(
        &self,
        device_id: DeviceId,
        entries: &[NewLogEntry],
    ) -> Result<u64, GatewayError> {
        ensure_single_device(device_id, entries)?;
        let mut state = self.state.write().await;
        let mut seen: BTreeSet<(DeviceId, i64)> = state
            .logs
            .iter()
            .map(|log| (log.device_id, log.user_sn))
            .collect();
        let now = Utc::now();
        let mut inserted = 0_u64;
        for entry in entries {
            if !seen.insert((entry.device_id, entry.sequence)) {
                continue;
            }
            state.logs.push(AttendanceLog {
                id: Uuid::new_v4(),
                device_id: entry.device_id,
                employee_id: entry.employee_id.clone(),
                employee_name: entry.employee_name.clone(),
                user_sn: entry.sequence,
                timestamp: entry.recorded_at,
                method: entry.method,
                event_type: entry.event_type.event_type().to_string(),
                raw_data: entry.raw_data.clone(),
                created_at: now,
                device: None,
            });
            inserted += 1;
        }
        tracing::debug!(%device_id, inserted, "appended log batch in memory");
        Ok(inserted)
    }
}

impl EmployeeDirectory for InMemoryStore {
    async fn lookup_names(
        &self,
        ids: &BTreeSet<String>,
    ) -> Result<HashMap<String, String>, GatewayError> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.employees.get(id).map(|name| (id.clone(), name.clone())))
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::domain::{AcquisitionMethod, DeviceRole};

    fn new_device(name: &str, is_active: bool) -> NewDevice {
        NewDevice {
            name: name.to_string(),
            ip_address: "10.0.0.1".to_string(),
            port: 4370,
            api_endpoint: "/api/logs".to_string(),
            is_active,
            role: Some(DeviceRole::CheckIn),
        }
    }

    fn entry(device_id: DeviceId, sequence: i64) -> NewLogEntry {
        NewLogEntry {
            device_id,
            employee_id: "7".to_string(),
            employee_name: None,
            sequence,
            recorded_at: Utc::now(),
            method: AcquisitionMethod::Fingerprint,
            event_type: DeviceRole::CheckIn,
            raw_data: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn enabled_listing_excludes_inactive_devices() {
        let store = InMemoryStore::new();
        let Ok(active) = store.create_device(new_device("a", true)).await else {
            panic!("create failed");
        };
        let Ok(_) = store.create_device(new_device("b", false)).await else {
            panic!("create failed");
        };
        let Ok(enabled) = store.list_enabled_devices().await else {
            panic!("list failed");
        };
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled.first().map(|d| d.id), Some(active.id));
    }

    #[tokio::test]
    async fn duplicate_serials_are_ignored() {
        let store = InMemoryStore::new();
        let id = DeviceId::new();
        let first = store.append_batch(id, &[entry(id, 1), entry(id, 2)]).await;
        let second = store.append_batch(id, &[entry(id, 2), entry(id, 3)]).await;
        assert!(matches!(first, Ok(2)));
        assert!(matches!(second, Ok(1)));
        assert!(matches!(store.max_sequence_for(id).await, Ok(3)));
        assert!(matches!(store.max_sequence_for(DeviceId::new()).await, Ok(0)));
    }

    #[tokio::test]
    async fn mixed_device_batch_is_rejected_whole() {
        let store = InMemoryStore::new();
        let id = DeviceId::new();
        let other = DeviceId::new();
        let err = assert_err!(store.append_batch(id, &[entry(id, 1), entry(other, 2)]).await);
        assert!(matches!(err, GatewayError::InvalidRequest(_)));
        assert_eq!(assert_ok!(store.max_sequence_for(id).await), 0);
        assert_eq!(assert_ok!(store.max_sequence_for(other).await), 0);
        assert_eq!(assert_ok!(store.append_batch(id, &[]).await), 0);
    }

    #[tokio::test]
    async fn delete_cascades_to_logs() {
        let store = InMemoryStore::new();
        let Ok(device) = store.create_device(new_device("a", true)).await else {
            panic!("create failed");
        };
        let _ = store.append_batch(device.id, &[entry(device.id, 1)]).await;
        assert!(matches!(store.delete_device(device.id).await, Ok(true)));
        assert!(store.logs_for(device.id).await.is_empty());
        assert!(matches!(store.delete_device(device.id).await, Ok(false)));
    }

    #[tokio::test]
    async fn lookup_returns_only_known_ids() {
        let store = InMemoryStore::new();
        store
            .upsert_employee(Employee {
                id: "1".to_string(),
                name: "Ada".to_string(),
            })
            .await;
        let ids: BTreeSet<String> = ["1".to_string(), "2".to_string()].into_iter().collect();
        let Ok(names) = store.lookup_names(&ids).await else {
            panic!("lookup failed");
        };
        assert_eq!(names.len(), 1);
        assert_eq!(names.get("1").map(String::as_str), Some("Ada"));
    }
}
