//! Service layer: business logic orchestration.
//!
//! [`IngestionRoutine`] runs one pass over one terminal and [`Poller`]
//! schedules passes over every enabled device. Both reach storage and
//! terminals only through the boundaries in [`ports`].
//! [`DeviceService`] backs the REST API and emits events through the
//! [`super::domain::EventBus`].

pub mod device_service;
pub mod ingestion;
pub mod poller;
pub mod ports;

pub use device_service::{DeviceDefaults, DeviceService};
pub use ingestion::{IngestionRoutine, PassOutcome, PassReport};
pub use poller::{CycleReport, Poller};
