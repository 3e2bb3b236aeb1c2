//! Domain layer: devices, attendance records, and the event system.
//!
//! This module contains the server-side domain model: device identity
//! and configuration, raw and stored attendance records, and the event
//! bus broadcasting device and ingestion activity.

pub mod attendance;
pub mod device;
pub mod device_id;
pub mod event_bus;
pub mod gateway_event;

pub use attendance::{
    AcquisitionMethod, AttendanceLog, DeviceSummary, Employee, NewLogEntry, RawAttendanceRecord,
};
pub use device::{Device, DeviceEndpoint, DevicePatch, DeviceRole, DeviceStatus, NewDevice};
pub use device_id::DeviceId;
pub use event_bus::EventBus;
pub use gateway_event::GatewayEvent;
