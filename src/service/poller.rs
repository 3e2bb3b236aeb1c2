//! Periodic polling of every enabled device.
//!
//! [`Poller::run`] fires one cycle immediately, then one per interval
//! until shutdown. Each tick spawns its cycle, so a slow cycle never
//! delays the next tick. A device already being ingested by an earlier
//! cycle is skipped rather than polled twice at once.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::ingestion::{IngestionRoutine, PassReport};
use super::ports::{DeviceClient, DeviceDirectory, EmployeeDirectory, LogStore};
use crate::domain::DeviceId;

/// Result of one cycle over the enabled devices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// The device listing failed and nothing was polled.
    pub aborted: bool,
    /// One report per device that was polled, in listing order.
    pub passes: Vec<PassReport>,
    /// Enabled devices without a role.
    pub skipped_no_role: Vec<DeviceId>,
    /// Devices still being ingested by an earlier cycle.
    pub skipped_in_flight: Vec<DeviceId>,
}

/// Set of devices with a pass in progress.
#[derive(Debug, Default)]
struct InFlight {
    devices: Mutex<HashSet<DeviceId>>,
}

impl InFlight {
    fn try_acquire(self: &Arc<Self>, device_id: DeviceId) -> Option<InFlightGuard> {
        let mut devices = self.devices.lock().unwrap_or_else(PoisonError::into_inner);
        devices.insert(device_id).then(|| InFlightGuard {
            in_flight: Arc::clone(self),
            device_id,
        })
    }
}

/// Releases the device when the pass ends, including on unwind.
#[derive(Debug)]
struct InFlightGuard {
    in_flight: Arc<InFlight>,
    device_id: DeviceId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut devices = self
            .in_flight
            .devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        devices.remove(&self.device_id);
    }
}

/// Drives [`IngestionRoutine`] over every enabled device on a fixed
/// interval.
#[derive(Debug)]
pub struct Poller<D, L, E, C> {
    routine: Arc<IngestionRoutine<D, L, E, C>>,
    interval: Duration,
    in_flight: Arc<InFlight>,
}

impl<D, L, E, C> Clone for Poller<D, L, E, C> {
    fn clone(&self) -> Self {
        Self {
            routine: Arc::clone(&self.routine),
            interval: self.interval,
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl<D, L, E, C> Poller<D, L, E, C>
where
    D: DeviceDirectory + 'static,
    L: LogStore + 'static,
    E: EmployeeDirectory + 'static,
    C: DeviceClient + 'static,
{
    /// Creates a poller. A zero `interval` is raised to one second.
    #[must_use]
    pub fn new(routine: IngestionRoutine<D, L, E, C>, interval: Duration) -> Self {
        Self {
            routine: Arc::new(routine),
            interval: interval.max(Duration::from_secs(1)),
            in_flight: Arc::default(),
        }
    }

    /// Interval between cycle starts.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs cycles until `shutdown` turns `true` or its sender is dropped.
    ///
    /// Cycles already spawned finish on their own; no new cycle starts
    /// after shutdown is observed.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "poller started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let poller = self.clone();
                    tokio::spawn(async move {
                        let _ = poller.run_cycle().await;
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("poller stopped");
    }

    /// Runs one cycle: lists enabled devices and runs a pass for each,
    /// one after another.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        let devices = match self.routine.directory().list_enabled_devices().await {
            Ok(devices) => devices,
            Err(err) => {
                error!(%err, "listing enabled devices failed, skipping cycle");
                report.aborted = true;
                return report;
            }
        };
        if devices.is_empty() {
            debug!("no active devices");
            return report;
        }
        debug!(count = devices.len(), "polling cycle started");

        for device in devices.iter().filter(|d| d.is_active) {
            let Some(role) = device.role else {
                warn!(device_id = %device.id, device = %device.name, "no role configured, skipping");
                report.skipped_no_role.push(device.id);
                continue;
            };
            let Some(_guard) = self.in_flight.try_acquire(device.id) else {
                debug!(device_id = %device.id, device = %device.name, "previous pass still running, skipping");
                report.skipped_in_flight.push(device.id);
                continue;
            };
            report.passes.push(self.routine.run_pass(device, role).await);
        }

        debug!(
            polled = report.passes.len(),
            skipped = report.skipped_no_role.len() + report.skipped_in_flight.len(),
            "polling cycle finished"
        );
        report
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::device_client::mock::{Script, ScriptedDeviceClient, record};
    use crate::domain::{Device, DeviceRole, DeviceStatus, EventBus, NewDevice};
    use crate::error::GatewayError;
    use crate::persistence::{DeviceRepository, InMemoryStore};
    use crate::service::ingestion::PassOutcome;

    type TestPoller = Poller<InMemoryStore, InMemoryStore, InMemoryStore, ScriptedDeviceClient>;

    fn poller(store: &InMemoryStore, client: &ScriptedDeviceClient) -> TestPoller {
        let routine = IngestionRoutine::new(
            store.clone(),
            store.clone(),
            store.clone(),
            client.clone(),
            Duration::from_secs(20),
            EventBus::new(16),
        );
        Poller::new(routine, Duration::from_secs(10))
    }

    async fn add_device(
        store: &InMemoryStore,
        address: &str,
        is_active: bool,
        role: Option<DeviceRole>,
    ) -> Device {
        let Ok(device) = store
            .create_device(NewDevice {
                name: format!("terminal {address}"),
                ip_address: address.to_string(),
                port: 4370,
                api_endpoint: "/api/logs".to_string(),
                is_active,
                role,
            })
            .await
        else {
            panic!("create failed");
        };
        device
    }

    #[tokio::test]
    async fn cycle_polls_only_enabled_devices_with_a_role() {
        let store = InMemoryStore::new();
        let client = ScriptedDeviceClient::new();
        let polled = add_device(&store, "10.0.0.1", true, Some(DeviceRole::CheckIn)).await;
        let disabled = add_device(&store, "10.0.0.2", false, Some(DeviceRole::CheckOut)).await;
        let no_role = add_device(&store, "10.0.0.3", true, None).await;
        for address in ["10.0.0.1", "10.0.0.2", "10.0.0.3"] {
            client.set(address, Script::Records(vec![record(1, "1")]));
        }

        let report = poller(&store, &client).run_cycle().await;

        assert!(!report.aborted);
        assert_eq!(report.passes.len(), 1);
        assert_eq!(report.passes.first().map(|p| p.device_id), Some(polled.id));
        assert_eq!(report.skipped_no_role, vec![no_role.id]);
        assert_eq!(client.connect_count(), 1);
        assert!(store.logs_for(disabled.id).await.is_empty());
        assert!(store.logs_for(no_role.id).await.is_empty());
        let Ok(Some(untouched)) = store.get_device(disabled.id).await else {
            panic!("device missing");
        };
        assert!(untouched.last_poll_at.is_none());
    }

    #[tokio::test]
    async fn failing_device_does_not_stop_the_cycle() {
        let store = InMemoryStore::new();
        let client = ScriptedDeviceClient::new();
        let down = add_device(&store, "10.0.0.1", true, Some(DeviceRole::Entry)).await;
        let up = add_device(&store, "10.0.0.2", true, Some(DeviceRole::Exit)).await;
        client.set("10.0.0.2", Script::Records(vec![record(3, "9")]));

        let report = poller(&store, &client).run_cycle().await;

        let outcomes: Vec<(DeviceId, PassOutcome)> =
            report.passes.iter().map(|p| (p.device_id, p.outcome)).collect();
        assert_eq!(
            outcomes,
            vec![
                (down.id, PassOutcome::ConnectFailed),
                (up.id, PassOutcome::Persisted { inserted: 1 }),
            ]
        );
        let logs = store.logs_for(up.id).await;
        assert_eq!(logs.first().map(|l| l.event_type.as_str()), Some("exit"));
    }

    #[tokio::test]
    async fn empty_directory_is_a_quiet_cycle() {
        let store = InMemoryStore::new();
        let client = ScriptedDeviceClient::new();
        let report = poller(&store, &client).run_cycle().await;
        assert_eq!(report, CycleReport::default());
    }

    #[derive(Debug, Clone, Copy)]
    struct DownDirectory;

    impl DeviceDirectory for DownDirectory {
        async fn list_enabled_devices(&self) -> Result<Vec<Device>, GatewayError> {
            Err(GatewayError::PersistenceError("connection refused".to_string()))
        }

        async fn update_device_status(
            &self,
            _device_id: DeviceId,
            _status: DeviceStatus,
            _polled_at: DateTime<Utc>,
        ) -> Result<(), GatewayError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn directory_failure_aborts_only_this_cycle() {
        let store = InMemoryStore::new();
        let client = ScriptedDeviceClient::new();
        let routine = IngestionRoutine::new(
            DownDirectory,
            store.clone(),
            store.clone(),
            client.clone(),
            Duration::from_secs(20),
            EventBus::new(16),
        );
        let poller = Poller::new(routine, Duration::from_secs(10));

        let report = poller.run_cycle().await;

        assert!(report.aborted);
        assert!(report.passes.is_empty());
        assert_eq!(client.connect_count(), 0);
    }

    #[tokio::test]
    async fn overlapping_cycles_do_not_poll_the_same_device_twice() {
        let store = InMemoryStore::new();
        let client = ScriptedDeviceClient::new().with_fetch_delay(Duration::from_millis(200));
        let device = add_device(&store, "10.0.0.1", true, Some(DeviceRole::CheckIn)).await;
        client.set("10.0.0.1", Script::Records(vec![record(1, "1")]));
        let poller = poller(&store, &client);

        let slow = tokio::spawn({
            let poller = poller.clone();
            async move { poller.run_cycle().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        let overlapping = poller.run_cycle().await;

        let Ok(first) = slow.await else {
            panic!("cycle task failed");
        };
        assert_eq!(overlapping.skipped_in_flight, vec![device.id]);
        assert!(overlapping.passes.is_empty());
        assert_eq!(first.passes.len(), 1);
        assert_eq!(client.connect_count(), 1);

        let after = poller.run_cycle().await;
        assert_eq!(after.passes.len(), 1);
        assert!(after.skipped_in_flight.is_empty());
    }

    #[tokio::test]
    async fn run_polls_immediately_and_stops_on_shutdown() {
        let store = InMemoryStore::new();
        let client = ScriptedDeviceClient::new();
        let device = add_device(&store, "10.0.0.1", true, Some(DeviceRole::CheckIn)).await;
        client.set("10.0.0.1", Script::Records(vec![record(1, "1"), record(2, "1")]));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(poller(&store, &client).run(rx));
        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = tx.send(true);

        let Ok(Ok(())) = tokio::time::timeout(Duration::from_secs(2), handle).await else {
            panic!("poller did not stop");
        };
        assert_eq!(store.logs_for(device.id).await.len(), 2);
        let Ok(Some(device)) = store.get_device(device.id).await else {
            panic!("device missing");
        };
        assert_eq!(device.status, DeviceStatus::Online);
    }
}
