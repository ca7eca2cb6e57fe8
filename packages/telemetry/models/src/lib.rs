#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! GPS telemetry event and stored sample types.
//!
//! Devices publish loosely-shaped JSON payloads. This crate projects them
//! into a [`TelemetryEvent`] for geofence evaluation and a
//! [`StoredSample`] for durable capture. The two projections differ on
//! purpose: evaluation needs validated coordinates, capture takes whatever
//! the device sent.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Device identity used when neither the transport nor the payload names
/// the sender.
pub const UNKNOWN_DEVICE: &str = "unknown-device";

/// Transport-level properties delivered alongside a message body.
///
/// Field names follow the IoT hub system properties so metadata captured
/// from a hub can be replayed unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportMetadata {
    /// Authenticated device identity. Overrides any `deviceId` in the body.
    #[serde(
        rename = "connection-device-id",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub device_id: Option<String>,
    /// Time the transport enqueued the message, as sent by the transport.
    #[serde(
        rename = "enqueuedtime",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub enqueued_time: Option<String>,
}

/// Errors raised while projecting a payload into a [`TelemetryEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    /// Neither spelling of latitude and longitude was usable.
    #[error("GPS coordinates not found in event data")]
    MissingCoordinates,
}

/// One GPS reading, validated for geofence evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryEvent {
    /// Resolved device identity.
    pub device_id: String,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Transport enqueue time, or processing time when absent.
    pub received_at: DateTime<Utc>,
}

impl TelemetryEvent {
    /// Projects a raw payload and its transport metadata into an event.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::MissingCoordinates`] if the payload carries
    /// no usable latitude/longitude pair.
    pub fn from_payload(
        payload: &Value,
        metadata: &TransportMetadata,
        now: DateTime<Utc>,
    ) -> Result<Self, ExtractError> {
        let (latitude, longitude) =
            extract_coordinates(payload).ok_or(ExtractError::MissingCoordinates)?;

        Ok(Self {
            device_id: resolve_device_id(metadata, payload),
            latitude,
            longitude,
            received_at: received_at(metadata, now),
        })
    }
}

/// Durable record of one inbound message.
///
/// Serialized as `{device_id, timestamp, gps, date}`. The `gps` field holds
/// the payload's `gps` sub-object (or the whole payload) exactly as sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSample {
    /// Resolved device identity.
    pub device_id: String,
    /// Transport enqueue time verbatim, or processing time in RFC 3339.
    pub timestamp: String,
    /// Raw GPS section of the payload.
    pub gps: Value,
    /// Calendar date (`YYYY-MM-DD`) the sample is indexed under.
    pub date: String,
    /// Instant the storage key is derived from.
    #[serde(skip)]
    pub recorded_at: DateTime<Utc>,
}

impl StoredSample {
    /// Captures a payload for storage. Never fails: missing coordinates are
    /// stored as whatever the device sent.
    #[must_use]
    pub fn capture(payload: &Value, metadata: &TransportMetadata, now: DateTime<Utc>) -> Self {
        let recorded_at = received_at(metadata, now);
        let timestamp = metadata
            .enqueued_time
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| now.to_rfc3339());

        Self {
            device_id: resolve_device_id(metadata, payload),
            timestamp,
            gps: gps_section(payload).clone(),
            date: recorded_at.format("%Y-%m-%d").to_string(),
            recorded_at,
        }
    }

    /// Object key this sample is written under.
    #[must_use]
    pub fn key(&self) -> String {
        sample_key(&self.device_id, &self.recorded_at)
    }
}

/// Builds the `{device_id}/{YYYY}/{MM}/{DD}/{HHMMSS}.json` key.
///
/// Two samples from one device within the same second share a key.
#[must_use]
pub fn sample_key(device_id: &str, at: &DateTime<Utc>) -> String {
    format!("{device_id}/{}.json", at.format("%Y/%m/%d/%H%M%S"))
}

/// Recovers the `YYYY-MM-DD` date from a sample key.
///
/// Returns `None` for keys with fewer than four path segments.
#[must_use]
pub fn date_from_key(key: &str) -> Option<String> {
    let parts: Vec<&str> = key.split('/').collect();
    if parts.len() >= 4 {
        Some(format!("{}-{}-{}", parts[1], parts[2], parts[3]))
    } else {
        None
    }
}

/// Resolves the sending device: transport metadata, then the payload's
/// `deviceId`, then [`UNKNOWN_DEVICE`]. Empty strings count as absent.
#[must_use]
pub fn resolve_device_id(metadata: &TransportMetadata, payload: &Value) -> String {
    metadata
        .device_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .or_else(|| {
            payload
                .get("deviceId")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
        })
        .unwrap_or(UNKNOWN_DEVICE)
        .to_string()
}

/// Returns the payload's `gps` member if present, otherwise the payload.
#[must_use]
pub fn gps_section(payload: &Value) -> &Value {
    payload.get("gps").unwrap_or(payload)
}

/// Extracts `(latitude, longitude)` from a payload.
///
/// `lat` wins over `latitude` and `lon` over `longitude`, but a zero or
/// unparseable value falls through to the other spelling. Numeric strings
/// are accepted.
#[must_use]
pub fn extract_coordinates(payload: &Value) -> Option<(f64, f64)> {
    let gps = gps_section(payload);
    let lat = coordinate(gps, "lat").or_else(|| coordinate(gps, "latitude"))?;
    let lon = coordinate(gps, "lon").or_else(|| coordinate(gps, "longitude"))?;
    Some((lat, lon))
}

fn coordinate(gps: &Value, field: &str) -> Option<f64> {
    let value = match gps.get(field)? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if value == 0.0 || !value.is_finite() {
        return None;
    }
    Some(value)
}

/// Transport enqueue time when it parses, otherwise `now`.
fn received_at(metadata: &TransportMetadata, now: DateTime<Utc>) -> DateTime<Utc> {
    metadata
        .enqueued_time
        .as_deref()
        .and_then(parse_enqueued_time)
        .unwrap_or(now)
}

/// Parses an enqueue time: RFC 3339, or a naive ISO 8601 timestamp taken
/// as UTC.
#[must_use]
pub fn parse_enqueued_time(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    None
}
