//! HTTP device client.
//!
//! A session is opened by probing the terminal's TCP port under the
//! connect timeout; records are then fetched with
//! `GET http://{address}:{port}{api_endpoint}`. The endpoint may answer
//! with a bare JSON array or with `{ "data": [...] }`. Each record needs a
//! serial (`userSn` / `user_sn`), a user id (`deviceUserId` / `user_id`)
//! and a timestamp (`recordTime` / `record_time`, RFC 3339, a naive
//! `YYYY-MM-DD HH:MM:SS` read as UTC, or Unix seconds); anything else in
//! the record is kept as audit payload.
//!
//! Records without a serial are skipped. A record that has a serial but
//! an unreadable user id or timestamp fails the whole fetch: dropping it
//! would let the stored watermark move past it.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use super::DeviceClientError;
use crate::domain::{DeviceEndpoint, RawAttendanceRecord};
use crate::service::ports::{DeviceClient, DeviceSession};

const SEQUENCE_KEYS: [&str; 3] = ["userSn", "user_sn", "sn"];
const USER_ID_KEYS: [&str; 3] = ["deviceUserId", "user_id", "userId"];
const TIME_KEYS: [&str; 3] = ["recordTime", "record_time", "timestamp"];
const NAIVE_TIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Device client reading attendance buffers over HTTP.
#[derive(Debug, Clone)]
pub struct HttpDeviceClient {
    http: reqwest::Client,
}

impl HttpDeviceClient {
    /// Creates a client with its own connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceClientError::Http`] if the HTTP client cannot be
    /// initialized (e.g. TLS backend failure).
    pub fn new() -> Result<Self, DeviceClientError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("attendance-gateway/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }
}

impl DeviceClient for HttpDeviceClient {
    type Session = HttpDeviceSession;

    async fn connect(
        &self,
        endpoint: DeviceEndpoint<'_>,
        timeout: Duration,
    ) -> Result<HttpDeviceSession, DeviceClientError> {
        let probe = TcpStream::connect((endpoint.address, endpoint.port));
        match tokio::time::timeout(timeout, probe).await {
            Ok(Ok(stream)) => drop(stream),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(DeviceClientError::ConnectionTimeout(
                    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                ));
            }
        }

        let url = record_url(endpoint);
        debug!(%url, "device reachable");
        Ok(HttpDeviceSession {
            http: self.http.clone(),
            url,
            timeout,
        })
    }
}

/// An open session to one terminal's record endpoint.
#[derive(Debug)]
pub struct HttpDeviceSession {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl DeviceSession for HttpDeviceSession {
    async fn fetch_records(&mut self) -> Result<Vec<RawAttendanceRecord>, DeviceClientError> {
        let body: Value = self
            .http
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        parse_records(body)
    }

    async fn close(self) -> Result<(), DeviceClientError> {
        debug!(url = %self.url, "device session closed");
        Ok(())
    }
}

/// Builds the record URL, bracketing IPv6 literals and normalizing the
/// leading slash of the path.
fn record_url(endpoint: DeviceEndpoint<'_>) -> String {
    let host = if endpoint.address.contains(':') && !endpoint.address.starts_with('[') {
        format!("[{}]", endpoint.address)
    } else {
        endpoint.address.to_string()
    };
    let path = endpoint.path.trim_start_matches('/');
    format!("http://{host}:{}/{path}", endpoint.port)
}

/// Extracts records from a record-endpoint response body.
///
/// # Errors
///
/// Returns [`DeviceClientError::InvalidResponse`] if the body is neither
/// an array, an object with a `data` array, nor `null`, or if a record
/// carrying a serial has no readable user id or timestamp.
pub fn parse_records(body: Value) -> Result<Vec<RawAttendanceRecord>, DeviceClientError> {
    let items = match body {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => return Ok(Vec::new()),
            Some(other) => {
                return Err(DeviceClientError::InvalidResponse(format!(
                    "`data` is not an array: {other}"
                )));
            }
        },
        other => {
            return Err(DeviceClientError::InvalidResponse(format!(
                "expected a record array, got {other}"
            )));
        }
    };

    let total = items.len();
    let mut records = Vec::with_capacity(total);
    for item in items {
        if let Some(record) = parse_record(item)? {
            records.push(record);
        }
    }
    if records.len() < total {
        warn!(
            skipped = total - records.len(),
            total, "device returned records without a serial"
        );
    }
    Ok(records)
}

/// `Ok(None)` for a record without a serial.
fn parse_record(item: Value) -> Result<Option<RawAttendanceRecord>, DeviceClientError> {
    let Some(sequence) = first_field(&item, &SEQUENCE_KEYS).and_then(as_i64) else {
        return Ok(None);
    };
    let user_id = first_field(&item, &USER_ID_KEYS)
        .and_then(as_id_string)
        .ok_or_else(|| {
            DeviceClientError::InvalidResponse(format!("record {sequence} has no user id"))
        })?;
    let recorded_at = first_field(&item, &TIME_KEYS)
        .and_then(as_timestamp)
        .ok_or_else(|| {
            DeviceClientError::InvalidResponse(format!(
                "record {sequence} has no readable timestamp"
            ))
        })?;
    Ok(Some(RawAttendanceRecord {
        user_id,
        sequence,
        recorded_at,
        payload: item,
    }))
}

fn first_field<'a>(item: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| item.get(*key).filter(|v| !v.is_null()))
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NAIVE_TIME_FORMATS.iter().find_map(|format| {
                        NaiveDateTime::parse_from_str(s, format)
                            .ok()
                            .map(|t| t.and_utc())
                    })
                })
        }
        Value::Number(n) => n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)),
        _ => None,
    }
}
