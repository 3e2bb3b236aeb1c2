//! PostgreSQL implementation of the persistence layer.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::models::{DEVICE_COLUMNS, DeviceRow, LogRow};
use super::{DeviceRepository, LogQuery, ensure_single_device};
use crate::config::GatewayConfig;
use crate::domain::{
    AttendanceLog, Device, DeviceId, DevicePatch, DeviceStatus, Employee, NewDevice,
    NewLogEntry,
};
use crate::error::GatewayError;
use crate::service::ports::{DeviceDirectory, EmployeeDirectory, LogStore};

/// Rows per `INSERT` statement; keeps bind parameters under the
/// PostgreSQL limit of 65 535.
const INSERT_CHUNK: usize = 1000;

const LOG_VIEW_SELECT: &str = "SELECT l.id, l.device_id, l.employee_id, l.employee_name, \
     l.user_sn, l.timestamp, l.method, l.event_type, l.raw_data, l.created_at, \
     d.name AS device_name, d.ip_address AS device_ip_address \
     FROM attendance_logs l LEFT JOIN devices d ON d.id = l.device_id";

/// PostgreSQL-backed store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool sized by `config`.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError::PersistenceError`] if the database is
    /// unreachable within the configured timeout.
    pub async fn connect(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await?;
        Ok(Self::new(pool))
    }

    async fn fetch_device(&self, device_id: DeviceId) -> Result<Option<Device>, GatewayError> {
        let row = sqlx::query_as::<_, DeviceRow>(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices WHERE id = $1"
        ))
        .bind(device_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Device::try_from).transpose()
    }
}

impl DeviceRepository for PostgresStore {
    async fn create_device(&self, input: NewDevice) -> Result<Device, GatewayError> {
        let row = sqlx::query_as::<_, DeviceRow>(&format!(
            "INSERT INTO devices (name, ip_address, port, api_endpoint, is_active, role, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {DEVICE_COLUMNS}"
        ))
        .bind(&input.name)
        .bind(&input.ip_address)
        .bind(i32::from(input.port))
        .bind(&input.api_endpoint)
        .bind(input.is_active)
        .bind(input.role.map(|r| r.event_type()))
        .bind(DeviceStatus::Offline.as_str())
        .fetch_one(&self.pool)
        .await?;
        Device::try_from(row)
    }

    async fn get_device(&self, device_id: DeviceId) -> Result<Option<Device>, GatewayError> {
        self.fetch_device(device_id).await
    }

    async fn list_devices(&self) -> Result<Vec<Device>, GatewayError> {
        let rows = sqlx::query_as::<_, DeviceRow>(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Device::try_from).collect()
    }

    async fn update_device(
        &self,
        device_id: DeviceId,
        patch: &DevicePatch,
    ) -> Result<Option<Device>, GatewayError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, DeviceRow>(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices WHERE id = $1 FOR UPDATE"
        ))
        .bind(device_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let mut device = Device::try_from(row)?;
        patch.apply(&mut device, Utc::now());

        let row = sqlx::query_as::<_, DeviceRow>(&format!(
            "UPDATE devices SET name = $1, ip_address = $2, port = $3, api_endpoint = $4, \
             is_active = $5, role = $6, updated_at = $7 WHERE id = $8 RETURNING {DEVICE_COLUMNS}"
        ))
        .bind(&device.name)
        .bind(&device.ip_address)
        .bind(i32::from(device.port))
        .bind(&device.api_endpoint)
        .bind(device.is_active)
        .bind(device.role.map(|r| r.event_type()))
        .bind(device.updated_at)
        .bind(device_id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Device::try_from(row).map(Some)
    }

    async fn delete_device(&self, device_id: DeviceId) -> Result<bool, GatewayError> {
        let result = sqlx::query("DELETE FROM devices WHERE id = $1")
            .bind(device_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_logs(&self, query: LogQuery) -> Result<Vec<AttendanceLog>, GatewayError> {
        let limit = i64::from(query.limit);
        let rows = if let Some(device_id) = query.device_id {
            sqlx::query_as::<_, LogRow>(&format!(
                "{LOG_VIEW_SELECT} WHERE l.device_id = $1 ORDER BY l.timestamp DESC LIMIT $2"
            ))
            .bind(device_id.as_uuid())
            .bind(limit)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, LogRow>(&format!(
                "{LOG_VIEW_SELECT} ORDER BY l.timestamp DESC LIMIT $1"
            ))
            .bind(limit)
            .fetch_all(&self.pool)
            .await
        }?;
        Ok(rows.into_iter().map(AttendanceLog::from).collect())
    }
}

impl DeviceDirectory for PostgresStore {
    async fn list_enabled_devices(&self) -> Result<Vec<Device>, GatewayError> {
        let rows = sqlx::query_as::<_, DeviceRow>(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices WHERE is_active ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Device::try_from).collect()
    }

    async fn update_device_status(
        &self,
        device_id: DeviceId,
        status: DeviceStatus,
        polled_at: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        sqlx::query("UPDATE devices SET status = $1, last_poll_at = $2 WHERE id = $3")
            .bind(status.as_str())
            .bind(polled_at)
            .bind(device_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

impl LogStore for PostgresStore {
    async fn max_sequence_for(&self, device_id: DeviceId) -> Result<i64, GatewayError> {
        let max = sqlx::query_scalar::<_, Option<i64>>(
            "SELECT MAX(user_sn) FROM attendance_logs WHERE device_id = $1",
        )
        .bind(device_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;
        Ok(max.unwrap_or(0))
    }

    async fn append_batch(
        &self,
        device_id: DeviceId,
        entries: &[NewLogEntry],
    ) -> Result<u64, GatewayError> {
        ensure_single_device(device_id, entries)?;
        if entries.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0_u64;
        for chunk in entries.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
                "INSERT INTO attendance_logs \
                 (device_id, employee_id, employee_name, user_sn, timestamp, method, event_type, raw_data) ",
            );
            builder.push_values(chunk, |mut row, entry| {
                row.push_bind(Uuid::from(entry.device_id))
                    .push_bind(entry.employee_id.clone())
                    .push_bind(entry.employee_name.clone())
                    .push_bind(entry.sequence)
                    .push_bind(entry.recorded_at)
                    .push_bind(entry.method.as_str())
                    .push_bind(entry.event_type.event_type())
                    .push_bind(entry.raw_data.clone());
            });
            builder.push(" ON CONFLICT (device_id, user_sn) DO NOTHING");
            let result = builder.build().execute(&mut *tx).await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;

        tracing::debug!(%device_id, inserted, batch = entries.len(), "appended log batch");
        Ok(inserted)
    }
}

impl EmployeeDirectory for PostgresStore {
    async fn lookup_names(
        &self,
        ids: &BTreeSet<String>,
    ) -> Result<HashMap<String, String>, GatewayError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let ids: Vec<String> = ids.iter().cloned().collect();
        let rows = sqlx::query_as::<_, Employee>("SELECT id, name FROM employees WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|e| (e.id, e.name)).collect())
    }
}
