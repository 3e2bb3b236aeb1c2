//! Per-device ingestion pass.
//!
//! One pass connects to a terminal, reads its buffer, keeps the records
//! above the stored watermark, resolves employee names, appends the batch
//! and records the device status. Every failure is contained in the pass:
//! [`IngestionRoutine::run_pass`] returns a [`PassReport`], never an error.
//!
//! ```text
//! Connecting ─┬─ ConnectFailed ─────────────────────────────┐
//!             └─ Fetching ─┬─ FetchFailed / NoData ─────────┤
//!                          └─ Filtering ─┬─ NoNewData ──────┤
//!                                        └─ Enriching       │
//!                                           └─ Persisting ──┤
//!                                                           ▼
//!                           Finalizing: close session, write status once
//! ```
//!
//! The watermark is always derived from storage, so a failed write is
//! retried on the next cycle with the same candidates.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::ports::{DeviceClient, DeviceDirectory, DeviceSession, EmployeeDirectory, LogStore};
use crate::domain::{
    AcquisitionMethod, Device, DeviceId, DeviceRole, DeviceStatus, EventBus, GatewayEvent,
    NewLogEntry, RawAttendanceRecord,
};

/// How a pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// The terminal could not be reached; nothing was read.
    ConnectFailed,
    /// Connected, but reading the buffer failed. Treated as no records.
    FetchFailed,
    /// The buffer was empty.
    NoData,
    /// Every buffered record was at or below the watermark.
    NoNewData,
    /// The batch was written; `inserted` excludes already-stored serials.
    Persisted {
        /// Rows actually inserted.
        inserted: u64,
    },
    /// The batch write failed and will be retried next cycle.
    PersistFailed,
}

impl PassOutcome {
    /// Device status recorded for this outcome.
    #[must_use]
    pub const fn status(self) -> DeviceStatus {
        match self {
            Self::ConnectFailed => DeviceStatus::Offline,
            Self::FetchFailed | Self::PersistFailed => DeviceStatus::Error,
            Self::NoData | Self::NoNewData | Self::Persisted { .. } => DeviceStatus::Online,
        }
    }
}

/// Summary of one pass over one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    /// Polled device.
    pub device_id: DeviceId,
    /// Terminal state of the pass.
    pub outcome: PassOutcome,
    /// Records returned by the terminal.
    pub fetched: usize,
    /// Records above the watermark.
    pub candidates: usize,
    /// Watermark used for filtering (0 when absent or unreadable).
    pub watermark: i64,
}

impl PassReport {
    fn new(device_id: DeviceId) -> Self {
        Self {
            device_id,
            outcome: PassOutcome::NoData,
            fetched: 0,
            candidates: 0,
            watermark: 0,
        }
    }

    /// Device status written at the end of the pass.
    #[must_use]
    pub const fn status(&self) -> DeviceStatus {
        self.outcome.status()
    }
}

/// Runs ingestion passes against the given collaborators.
#[derive(Debug)]
pub struct IngestionRoutine<D, L, E, C> {
    directory: D,
    logs: L,
    employees: E,
    client: C,
    connect_timeout: Duration,
    event_bus: EventBus,
}

impl<D, L, E, C> IngestionRoutine<D, L, E, C>
where
    D: DeviceDirectory,
    L: LogStore,
    E: EmployeeDirectory,
    C: DeviceClient,
{
    /// Creates a routine. `connect_timeout` bounds each terminal session.
    #[must_use]
    pub fn new(
        directory: D,
        logs: L,
        employees: E,
        client: C,
        connect_timeout: Duration,
        event_bus: EventBus,
    ) -> Self {
        Self {
            directory,
            logs,
            employees,
            client,
            connect_timeout,
            event_bus,
        }
    }

    /// The device directory this routine reports status to.
    #[must_use]
    pub fn directory(&self) -> &D {
        &self.directory
    }

    /// Runs one complete pass over `device`, tagging entries with `role`.
    ///
    /// The session, when one was opened, is closed on every path, and the
    /// device status is written exactly once.
    pub async fn run_pass(&self, device: &Device, role: DeviceRole) -> PassReport {
        let mut report = PassReport::new(device.id);

        match self
            .client
            .connect(device.endpoint(), self.connect_timeout)
            .await
        {
            Ok(mut session) => {
                debug!(device_id = %device.id, device = %device.name, "connected");
                let outcome = self.ingest(&mut session, device, role, &mut report).await;
                report.outcome = outcome;
                if let Err(err) = session.close().await {
                    debug!(device_id = %device.id, %err, "disconnect failed");
                }
            }
            Err(err) => {
                warn!(
                    device_id = %device.id,
                    device = %device.name,
                    address = %device.ip_address,
                    port = device.port,
                    %err,
                    "device unreachable"
                );
                report.outcome = PassOutcome::ConnectFailed;
            }
        }

        self.finalize(device, &report).await;
        report
    }

    async fn ingest(
        &self,
        session: &mut C::Session,
        device: &Device,
        role: DeviceRole,
        report: &mut PassReport,
    ) -> PassOutcome {
        let records = match session.fetch_records().await {
            Ok(records) => records,
            Err(err) => {
                warn!(device_id = %device.id, device = %device.name, %err, "fetching records failed");
                return PassOutcome::FetchFailed;
            }
        };
        report.fetched = records.len();
        if records.is_empty() {
            return PassOutcome::NoData;
        }

        let watermark = self.watermark(device).await;
        report.watermark = watermark;

        let candidates: Vec<RawAttendanceRecord> = records
            .into_iter()
            .filter(|record| record.sequence > watermark)
            .collect();
        report.candidates = candidates.len();
        if candidates.is_empty() {
            debug!(device_id = %device.id, device = %device.name, watermark, "no new records");
            return PassOutcome::NoNewData;
        }
        info!(
            device_id = %device.id,
            device = %device.name,
            count = candidates.len(),
            watermark,
            "found new records"
        );

        let names = self.resolve_names(device, &candidates).await;
        let entries = build_entries(device.id, role, candidates, &names);
        let max_sequence = entries.iter().map(|e| e.sequence).max().unwrap_or(watermark);

        match self.logs.append_batch(device.id, &entries).await {
            Ok(inserted) => {
                info!(device_id = %device.id, device = %device.name, inserted, max_sequence, "saved logs");
                if inserted > 0 {
                    let _ = self.event_bus.publish(GatewayEvent::LogsIngested {
                        device_id: device.id,
                        count: inserted,
                        max_sequence,
                        timestamp: Utc::now(),
                    });
                }
                PassOutcome::Persisted { inserted }
            }
            Err(err) => {
                error!(
                    device_id = %device.id,
                    device = %device.name,
                    batch = entries.len(),
                    %err,
                    "failed to save logs"
                );
                PassOutcome::PersistFailed
            }
        }
    }

    /// Reads the stored watermark. An unreadable watermark counts as 0 so
    /// records are re-offered rather than silently skipped.
    async fn watermark(&self, device: &Device) -> i64 {
        match self.logs.max_sequence_for(device.id).await {
            Ok(watermark) => watermark,
            Err(err) => {
                warn!(device_id = %device.id, %err, "watermark query failed, re-offering all records");
                0
            }
        }
    }

    /// Resolves names for the distinct user ids of `records` in one
    /// lookup. A failed lookup leaves every name unresolved.
    async fn resolve_names(
        &self,
        device: &Device,
        records: &[RawAttendanceRecord],
    ) -> HashMap<String, String> {
        let ids: BTreeSet<String> = records.iter().map(|r| r.user_id.clone()).collect();
        match self.employees.lookup_names(&ids).await {
            Ok(names) => {
                let unmatched = ids.len().saturating_sub(names.len());
                if unmatched > 0 {
                    debug!(device_id = %device.id, unmatched, "records without employee match");
                }
                names
            }
            Err(err) => {
                warn!(device_id = %device.id, %err, "employee lookup failed, storing records without names");
                HashMap::new()
            }
        }
    }

    async fn finalize(&self, device: &Device, report: &PassReport) {
        let status = report.status();
        let polled_at = Utc::now();
        if let Err(err) = self
            .directory
            .update_device_status(device.id, status, polled_at)
            .await
        {
            warn!(device_id = %device.id, %status, %err, "failed to update device status");
        }
        let _ = self.event_bus.publish(GatewayEvent::DeviceStatusChanged {
            device_id: device.id,
            status,
            polled_at,
        });
    }
}

/// Builds one log entry per record. Records are never dropped: an id
/// missing from `names` yields an entry without a name.
#[must_use]
pub fn build_entries(
    device_id: DeviceId,
    role: DeviceRole,
    records: Vec<RawAttendanceRecord>,
    names: &HashMap<String, String>,
) -> Vec<NewLogEntry> {
    records
        .into_iter()
        .map(|record| NewLogEntry {
            device_id,
            employee_name: names.get(&record.user_id).cloned(),
            employee_id: record.user_id,
            sequence: record.sequence,
            recorded_at: record.recorded_at,
            method: AcquisitionMethod::Fingerprint,
            event_type: role,
            raw_data: record.payload,
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use chrono::DateTime;

    use super::*;
    use crate::device_client::mock::{Script, ScriptedDeviceClient, record};
    use crate::domain::{Employee, NewDevice};
    use crate::error::GatewayError;
    use crate::persistence::{DeviceRepository, InMemoryStore};

    const ADDRESS: &str = "10.0.0.5";

    /// Log store whose reads or writes can be made to fail.
    #[derive(Debug, Clone, Default)]
    struct FlakyLogs {
        inner: InMemoryStore,
        fail_watermark: Arc<AtomicBool>,
        fail_append: Arc<AtomicBool>,
    }

    impl LogStore for FlakyLogs {
        async fn max_sequence_for(&self, device_id: DeviceId) -> Result<i64, GatewayError> {
            if self.fail_watermark.load(Ordering::SeqCst) {
                return Err(GatewayError::PersistenceError("read timeout".to_string()));
            }
            self.inner.max_sequence_for(device_id).await
        }

        async fn append_batch(
            &self,
            device_id: DeviceId,
            entries: &[NewLogEntry],
        ) -> Result<u64, GatewayError> {
            if self.fail_append.load(Ordering::SeqCst) {
                return Err(GatewayError::PersistenceError("write refused".to_string()));
            }
            self.inner.append_batch(device_id, entries).await
        }
    }

    #[derive(Debug, Clone, Copy)]
    struct BrokenEmployees;

    impl EmployeeDirectory for BrokenEmployees {
        async fn lookup_names(
            &self,
            _ids: &BTreeSet<String>,
        ) -> Result<HashMap<String, String>, GatewayError> {
            Err(GatewayError::PersistenceError("employees unavailable".to_string()))
        }
    }

    #[derive(Debug, Clone, Copy)]
    struct ReadOnlyDirectory;

    impl DeviceDirectory for ReadOnlyDirectory {
        async fn list_enabled_devices(&self) -> Result<Vec<Device>, GatewayError> {
            Ok(Vec::new())
        }

        async fn update_device_status(
            &self,
            _device_id: DeviceId,
            _status: DeviceStatus,
            _polled_at: DateTime<Utc>,
        ) -> Result<(), GatewayError> {
            Err(GatewayError::PersistenceError("read-only replica".to_string()))
        }
    }

    struct Fixture {
        store: InMemoryStore,
        logs: FlakyLogs,
        client: ScriptedDeviceClient,
        bus: EventBus,
        device: Device,
    }

    impl Fixture {
        async fn new() -> Self {
            let store = InMemoryStore::new();
            let Ok(device) = store
                .create_device(NewDevice {
                    name: "Front door".to_string(),
                    ip_address: ADDRESS.to_string(),
                    port: 4370,
                    api_endpoint: "/api/logs".to_string(),
                    is_active: true,
                    role: Some(DeviceRole::CheckIn),
                })
                .await
            else {
                panic!("create failed");
            };
            let logs = FlakyLogs {
                inner: store.clone(),
                ..FlakyLogs::default()
            };
            Self {
                store,
                logs,
                client: ScriptedDeviceClient::new(),
                bus: EventBus::new(64),
                device,
            }
        }

        fn routine(
            &self,
        ) -> IngestionRoutine<InMemoryStore, FlakyLogs, InMemoryStore, ScriptedDeviceClient> {
            IngestionRoutine::new(
                self.store.clone(),
                self.logs.clone(),
                self.store.clone(),
                self.client.clone(),
                Duration::from_secs(20),
                self.bus.clone(),
            )
        }

        async fn seed(&self, sequences: &[i64]) {
            let records = sequences.iter().map(|s| record(*s, "1")).collect();
            let entries = build_entries(self.device.id, DeviceRole::CheckIn, records, &HashMap::new());
            let Ok(_) = self.store.append_batch(self.device.id, &entries).await else {
                panic!("seed failed");
            };
        }

        async fn stored_sequences(&self) -> Vec<i64> {
            self.store
                .logs_for(self.device.id)
                .await
                .iter()
                .map(|l| l.user_sn)
                .collect()
        }

        async fn stored_device(&self) -> Device {
            let Ok(Some(device)) = self.store.get_device(self.device.id).await else {
                panic!("device missing");
            };
            device
        }
    }

    #[tokio::test]
    async fn only_records_above_watermark_are_stored() {
        let fx = Fixture::new().await;
        fx.seed(&[5]).await;
        fx.client.set(
            ADDRESS,
            Script::Records(vec![record(5, "1"), record(7, "1"), record(9, "2")]),
        );

        let report = fx.routine().run_pass(&fx.device, DeviceRole::CheckIn).await;

        assert_eq!(report.outcome, PassOutcome::Persisted { inserted: 2 });
        assert_eq!(report.watermark, 5);
        assert_eq!(report.fetched, 3);
        assert_eq!(report.candidates, 2);
        assert_eq!(fx.stored_sequences().await, vec![5, 7, 9]);
        assert!(matches!(fx.store.max_sequence_for(fx.device.id).await, Ok(9)));
        assert_eq!(fx.stored_device().await.status, DeviceStatus::Online);
        assert_eq!(fx.client.close_count(), 1);
    }

    #[tokio::test]
    async fn rerun_after_success_stores_nothing() {
        let fx = Fixture::new().await;
        fx.client
            .set(ADDRESS, Script::Records(vec![record(1, "1"), record(2, "1")]));
        let routine = fx.routine();

        let first = routine.run_pass(&fx.device, DeviceRole::CheckIn).await;
        let second = routine.run_pass(&fx.device, DeviceRole::CheckIn).await;

        assert_eq!(first.outcome, PassOutcome::Persisted { inserted: 2 });
        assert_eq!(second.outcome, PassOutcome::NoNewData);
        assert_eq!(second.watermark, 2);
        assert_eq!(fx.stored_sequences().await, vec![1, 2]);
        assert_eq!(fx.client.close_count(), 2);
    }

    #[tokio::test]
    async fn unreachable_device_goes_offline_without_writes() {
        let fx = Fixture::new().await;
        fx.client.set(ADDRESS, Script::Unreachable);

        let report = fx.routine().run_pass(&fx.device, DeviceRole::CheckIn).await;

        assert_eq!(report.outcome, PassOutcome::ConnectFailed);
        assert!(fx.stored_sequences().await.is_empty());
        let device = fx.stored_device().await;
        assert_eq!(device.status, DeviceStatus::Offline);
        assert!(device.last_poll_at.is_some());
        assert_eq!(fx.client.close_count(), 0);
    }

    #[tokio::test]
    async fn unmatched_employee_is_stored_without_name() {
        let fx = Fixture::new().await;
        fx.store
            .upsert_employee(Employee {
                id: "7".to_string(),
                name: "Grace Hopper".to_string(),
            })
            .await;
        fx.client
            .set(ADDRESS, Script::Records(vec![record(1, "7"), record(2, "42")]));

        let report = fx.routine().run_pass(&fx.device, DeviceRole::CheckIn).await;

        assert_eq!(report.outcome, PassOutcome::Persisted { inserted: 2 });
        let logs = fx.store.logs_for(fx.device.id).await;
        let names: Vec<(&str, Option<&str>)> = logs
            .iter()
            .map(|l| (l.employee_id.as_str(), l.employee_name.as_deref()))
            .collect();
        assert_eq!(names, vec![("7", Some("Grace Hopper")), ("42", None)]);
        assert!(logs.iter().all(|l| l.event_type == "check_in"));
        assert!(logs.iter().all(|l| l.method == AcquisitionMethod::Fingerprint));
    }

    #[tokio::test]
    async fn failed_employee_lookup_keeps_every_record() {
        let fx = Fixture::new().await;
        fx.client.set(
            ADDRESS,
            Script::Records(vec![record(1, "7"), record(2, "8"), record(3, "7")]),
        );
        let routine = IngestionRoutine::new(
            fx.store.clone(),
            fx.logs.clone(),
            BrokenEmployees,
            fx.client.clone(),
            Duration::from_secs(20),
            fx.bus.clone(),
        );

        let report = routine.run_pass(&fx.device, DeviceRole::CheckIn).await;

        assert_eq!(report.outcome, PassOutcome::Persisted { inserted: 3 });
        let logs = fx.store.logs_for(fx.device.id).await;
        assert_eq!(logs.len(), 3);
        assert!(logs.iter().all(|l| l.employee_name.is_none()));
    }

    #[tokio::test]
    async fn unreadable_watermark_reoffers_everything_without_duplicates() {
        let fx = Fixture::new().await;
        fx.seed(&[1, 2]).await;
        fx.logs.fail_watermark.store(true, Ordering::SeqCst);
        fx.client.set(
            ADDRESS,
            Script::Records(vec![record(1, "1"), record(2, "1"), record(3, "1")]),
        );

        let report = fx.routine().run_pass(&fx.device, DeviceRole::CheckIn).await;

        assert_eq!(report.watermark, 0);
        assert_eq!(report.candidates, 3);
        assert_eq!(report.outcome, PassOutcome::Persisted { inserted: 1 });
        assert_eq!(fx.stored_sequences().await, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn failed_write_is_retried_next_pass() {
        let fx = Fixture::new().await;
        fx.client
            .set(ADDRESS, Script::Records(vec![record(4, "1"), record(5, "1")]));
        fx.logs.fail_append.store(true, Ordering::SeqCst);
        let routine = fx.routine();

        let failed = routine.run_pass(&fx.device, DeviceRole::CheckIn).await;
        assert_eq!(failed.outcome, PassOutcome::PersistFailed);
        assert_eq!(fx.stored_device().await.status, DeviceStatus::Error);
        assert!(fx.stored_sequences().await.is_empty());

        fx.logs.fail_append.store(false, Ordering::SeqCst);
        let retried = routine.run_pass(&fx.device, DeviceRole::CheckIn).await;
        assert_eq!(retried.outcome, PassOutcome::Persisted { inserted: 2 });
        assert_eq!(fx.stored_sequences().await, vec![4, 5]);
        assert_eq!(fx.stored_device().await.status, DeviceStatus::Online);
    }

    #[tokio::test]
    async fn fetch_failure_counts_as_empty_and_closes_session() {
        let fx = Fixture::new().await;
        fx.client.set(ADDRESS, Script::FetchFails);

        let report = fx.routine().run_pass(&fx.device, DeviceRole::CheckIn).await;

        assert_eq!(report.outcome, PassOutcome::FetchFailed);
        assert_eq!(report.fetched, 0);
        assert!(fx.stored_sequences().await.is_empty());
        assert_eq!(fx.stored_device().await.status, DeviceStatus::Error);
        assert_eq!(fx.client.close_count(), 1);
    }

    #[tokio::test]
    async fn empty_buffer_marks_device_online() {
        let fx = Fixture::new().await;
        fx.client.set(ADDRESS, Script::Records(Vec::new()));

        let report = fx.routine().run_pass(&fx.device, DeviceRole::CheckIn).await;

        assert_eq!(report.outcome, PassOutcome::NoData);
        assert_eq!(fx.stored_device().await.status, DeviceStatus::Online);
        assert_eq!(fx.client.close_count(), 1);
    }

    #[tokio::test]
    async fn status_write_failure_does_not_escape() {
        let fx = Fixture::new().await;
        fx.client.set(ADDRESS, Script::Records(vec![record(1, "1")]));
        let routine = IngestionRoutine::new(
            ReadOnlyDirectory,
            fx.logs.clone(),
            fx.store.clone(),
            fx.client.clone(),
            Duration::from_secs(20),
            fx.bus.clone(),
        );

        let report = routine.run_pass(&fx.device, DeviceRole::CheckIn).await;

        assert_eq!(report.outcome, PassOutcome::Persisted { inserted: 1 });
        assert_eq!(fx.client.close_count(), 1);
    }

    #[tokio::test]
    async fn pass_publishes_ingest_and_status_events() {
        let fx = Fixture::new().await;
        let mut rx = fx.bus.subscribe();
        fx.client
            .set(ADDRESS, Script::Records(vec![record(3, "1"), record(8, "1")]));

        let _ = fx.routine().run_pass(&fx.device, DeviceRole::CheckIn).await;

        let Ok(GatewayEvent::LogsIngested {
            count, max_sequence, ..
        }) = rx.recv().await
        else {
            panic!("expected logs_ingested first");
        };
        assert_eq!((count, max_sequence), (2, 8));
        let Ok(GatewayEvent::DeviceStatusChanged { status, .. }) = rx.recv().await else {
            panic!("expected device_status_changed");
        };
        assert_eq!(status, DeviceStatus::Online);
    }

    #[test]
    fn entries_take_event_type_from_role() {
        let names = HashMap::from([("1".to_string(), "Ada".to_string())]);
        let device_id = DeviceId::new();
        let entries = build_entries(
            device_id,
            DeviceRole::CheckOut,
            vec![record(1, "1"), record(2, "2")],
            &names,
        );
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.event_type == DeviceRole::CheckOut));
        assert!(entries.iter().all(|e| e.device_id == device_id));
        assert_eq!(
            entries.iter().map(|e| e.employee_name.clone()).collect::<Vec<_>>(),
            vec![Some("Ada".to_string()), None]
        );
    }
}
