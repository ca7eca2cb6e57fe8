#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the geotrack server.

use serde::{Deserialize, Serialize};

/// Latitude used by the manual geofence check when none is given.
pub const DEFAULT_TEST_LATITUDE: f64 = 36.5273;

/// Longitude used by the manual geofence check when none is given.
pub const DEFAULT_TEST_LONGITUDE: f64 = 5.86945;

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiHealth {
    /// Whether the service is healthy.
    pub healthy: bool,
    /// Server version.
    pub version: String,
}

/// A query coordinate that is not a number.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("could not convert {name}={value:?} to a number")]
pub struct InvalidCoordinate {
    /// Parameter name.
    pub name: &'static str,
    /// Value as given.
    pub value: String,
}

/// Query parameters for `GET /api/test_geofence`.
///
/// Kept as strings so a malformed number reaches the handler instead of
/// being rejected by the extractor.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestGeofenceParams {
    /// Latitude to check.
    pub lat: Option<String>,
    /// Longitude to check.
    pub lon: Option<String>,
}

impl TestGeofenceParams {
    /// The coordinates to check, with defaults filled in.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidCoordinate`] if a given value does not parse.
    pub fn coordinates(&self) -> Result<(f64, f64), InvalidCoordinate> {
        Ok((
            parse_coordinate("lat", self.lat.as_deref(), DEFAULT_TEST_LATITUDE)?,
            parse_coordinate("lon", self.lon.as_deref(), DEFAULT_TEST_LONGITUDE)?,
        ))
    }
}

fn parse_coordinate(
    name: &'static str,
    value: Option<&str>,
    default: f64,
) -> Result<f64, InvalidCoordinate> {
    value.map_or(Ok(default), |value| {
        value.trim().parse().map_err(|_| InvalidCoordinate {
            name,
            value: value.to_string(),
        })
    })
}

/// Response for an accepted `POST /api/events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEventAccepted {
    /// Partition the event was routed to.
    pub partition: usize,
    /// Offset within that partition.
    pub offset: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_coordinates_use_defaults() {
        let params: TestGeofenceParams = serde_json::from_str(r#"{"lat": "1.5"}"#).unwrap();
        assert_eq!(params.coordinates(), Ok((1.5, DEFAULT_TEST_LONGITUDE)));
        assert_eq!(
            TestGeofenceParams::default().coordinates(),
            Ok((DEFAULT_TEST_LATITUDE, DEFAULT_TEST_LONGITUDE))
        );
    }

    #[test]
    fn malformed_coordinate_names_the_parameter() {
        let params = TestGeofenceParams {
            lat: Some("36.5".to_string()),
            lon: Some("east".to_string()),
        };
        let err = params.coordinates().unwrap_err();
        assert_eq!(err.name, "lon");
        assert_eq!(err.to_string(), r#"could not convert lon="east" to a number"#);
    }
}
