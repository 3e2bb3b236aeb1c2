//! Terminal clients.
//!
//! [`HttpDeviceClient`] is the production [`crate::service::ports::DeviceClient`]:
//! it probes the terminal over TCP and reads its attendance buffer from the
//! device's record endpoint. The terminal's native protocol is not spoken
//! here; terminals are expected to sit behind a bridge exposing their
//! buffer as JSON.

pub mod http;
#[cfg(test)]
pub mod mock;

pub use http::{HttpDeviceClient, HttpDeviceSession};

use thiserror::Error;

/// Errors raised while talking to a terminal.
#[derive(Debug, Error)]
pub enum DeviceClientError {
    /// The terminal did not accept a connection in time.
    #[error("connection timeout after {0}ms")]
    ConnectionTimeout(u64),

    /// Low-level I/O error (refused, unreachable, reset).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request to the record endpoint failed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The terminal answered with something that is not a record list.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}
