//! Scripted device client for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{TimeZone, Utc};

use super::DeviceClientError;
use crate::domain::{DeviceEndpoint, RawAttendanceRecord};
use crate::service::ports::{DeviceClient, DeviceSession};

/// What a scripted terminal does when contacted.
#[derive(Debug, Clone)]
pub enum Script {
    /// Connecting times out.
    Unreachable,
    /// Connecting succeeds and the buffer holds these records.
    Records(Vec<RawAttendanceRecord>),
    /// Connecting succeeds but reading the buffer fails.
    FetchFails,
}

#[derive(Debug, Default)]
struct Counters {
    connects: AtomicUsize,
    closes: AtomicUsize,
}

/// Device client answering from per-address scripts. Unknown addresses
/// are unreachable.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDeviceClient {
    scripts: Arc<Mutex<HashMap<String, Script>>>,
    counters: Arc<Counters>,
    fetch_delay: Option<Duration>,
}

impl ScriptedDeviceClient {
    /// Creates a client with no scripts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every fetch sleep first, to keep passes in flight.
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    /// Sets the script for `address`.
    pub fn set(&self, address: &str, script: Script) {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.insert(address.to_string(), script);
        }
    }

    /// Number of successful connects.
    pub fn connect_count(&self) -> usize {
        self.counters.connects.load(Ordering::SeqCst)
    }

    /// Number of closed sessions.
    pub fn close_count(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }
}

impl DeviceClient for ScriptedDeviceClient {
    type Session = ScriptedSession;

    async fn connect(
        &self,
        endpoint: DeviceEndpoint<'_>,
        timeout: Duration,
    ) -> Result<ScriptedSession, DeviceClientError> {
        let script = self
            .scripts
            .lock()
            .ok()
            .and_then(|scripts| scripts.get(endpoint.address).cloned())
            .unwrap_or(Script::Unreachable);
        if matches!(script, Script::Unreachable) {
            return Err(DeviceClientError::ConnectionTimeout(
                u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            ));
        }
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedSession {
            script,
            counters: Arc::clone(&self.counters),
            fetch_delay: self.fetch_delay,
        })
    }
}

/// Session handed out by [`ScriptedDeviceClient`].
#[derive(Debug)]
pub struct ScriptedSession {
    script: Script,
    counters: Arc<Counters>,
    fetch_delay: Option<Duration>,
}

impl DeviceSession for ScriptedSession {
    async fn fetch_records(&mut self) -> Result<Vec<RawAttendanceRecord>, DeviceClientError> {
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        match &self.script {
            Script::Records(records) => Ok(records.clone()),
            Script::FetchFails => Err(DeviceClientError::InvalidResponse(
                "scripted fetch failure".to_string(),
            )),
            Script::Unreachable => Ok(Vec::new()),
        }
    }

    async fn close(self) -> Result<(), DeviceClientError> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Builds a raw record with a deterministic timestamp.
pub fn record(sequence: i64, user_id: &str) -> RawAttendanceRecord {
    let recorded_at = Utc
        .timestamp_opt(1_714_636_800 + sequence * 60, 0)
        .single()
        .unwrap_or_default();
    RawAttendanceRecord {
        user_id: user_id.to_string(),
        sequence,
        recorded_at,
        payload: serde_json::json!({
            "userSn": sequence,
            "deviceUserId": user_id,
            "recordTime": recorded_at.to_rfc3339(),
        }),
    }
}
