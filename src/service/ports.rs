//! Boundaries the ingestion core depends on.
//!
//! The poller never talks to PostgreSQL or to a terminal directly. It
//! goes through these traits, implemented by [`crate::persistence`] and
//! [`crate::device_client`] in production and by in-memory doubles in
//! tests. Methods return `Send` futures so passes can run on spawned
//! tasks.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::device_client::DeviceClientError;
use crate::domain::{Device, DeviceEndpoint, DeviceId, DeviceStatus, NewLogEntry, RawAttendanceRecord};
use crate::error::GatewayError;

/// Query and status-update access to device configuration.
pub trait DeviceDirectory: Send + Sync {
    /// Returns every device with the polling flag set.
    fn list_enabled_devices(&self) -> impl Future<Output = Result<Vec<Device>, GatewayError>> + Send;

    /// Records the outcome of a pass.
    fn update_device_status(
        &self,
        device_id: DeviceId,
        status: DeviceStatus,
        polled_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;
}

/// Append-only attendance log.
pub trait LogStore: Send + Sync {
    /// Highest stored serial for the device, or 0 when nothing is stored.
    fn max_sequence_for(
        &self,
        device_id: DeviceId,
    ) -> impl Future<Output = Result<i64, GatewayError>> + Send;

    /// Appends `entries` in one write and returns the number of rows
    /// inserted. Entries whose `(device, sequence)` pair is already stored
    /// are ignored. Every entry must belong to `device_id`; a mixed batch
    /// is rejected with [`GatewayError::InvalidRequest`] before any write.
    fn append_batch(
        &self,
        device_id: DeviceId,
        entries: &[NewLogEntry],
    ) -> impl Future<Output = Result<u64, GatewayError>> + Send;
}

/// Employee id to display name lookup.
pub trait EmployeeDirectory: Send + Sync {
    /// Resolves the given ids in one query. Ids without a match are simply
    /// absent from the result.
    fn lookup_names(
        &self,
        ids: &BTreeSet<String>,
    ) -> impl Future<Output = Result<HashMap<String, String>, GatewayError>> + Send;
}

/// Opens sessions to terminals.
pub trait DeviceClient: Send + Sync {
    /// Session type produced by [`DeviceClient::connect`].
    type Session: DeviceSession;

    /// Opens a session, failing if the terminal cannot be reached within
    /// `timeout`.
    fn connect(
        &self,
        endpoint: DeviceEndpoint<'_>,
        timeout: Duration,
    ) -> impl Future<Output = Result<Self::Session, DeviceClientError>> + Send;
}

/// A single open session to one terminal. Never shared between passes.
pub trait DeviceSession: Send {
    /// Returns the terminal's buffered attendance records.
    fn fetch_records(
        &mut self,
    ) -> impl Future<Output = Result<Vec<RawAttendanceRecord>, DeviceClientError>> + Send;

    /// Ends the session.
    fn close(self) -> impl Future<Output = Result<(), DeviceClientError>> + Send;
}
