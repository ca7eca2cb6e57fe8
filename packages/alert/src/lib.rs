#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geofence alert notifications.
//!
//! [`AlertDispatcher`] sends one notification per call through a
//! [`Notifier`]. It keeps no state between calls, so a device that stays
//! inside the geofence produces an alert for every sample. Without a
//! configured notifier it logs the alert instead.

pub mod sendgrid;

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};

pub use sendgrid::{SendGridNotifier, SendGridSettings};

/// Errors that can occur while delivering an alert.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The HTTP request could not be sent or its response read.
    #[error("Alert request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("Alert rejected with status {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },
}

/// A single "device entered the geofence" notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    /// Device that triggered the alert.
    pub device_id: String,
    /// Latitude of the triggering sample.
    pub latitude: f64,
    /// Longitude of the triggering sample.
    pub longitude: f64,
    /// Absolute decision magnitude in meters.
    pub distance_m: f64,
    /// When the alert was raised.
    pub raised_at: DateTime<Utc>,
}

impl Alert {
    /// Email subject line.
    #[must_use]
    pub fn subject(&self) -> String {
        format!("{} Entered Geofence", self.device_id)
    }

    /// Plain-text body.
    #[must_use]
    pub fn body(&self) -> String {
        format!(
            "Device {} has entered the geofence area!\n\n\
             Coordinates: {}, {}\n\
             Distance from boundary: {:.2}m\n\
             Time: {}",
            self.device_id,
            self.latitude,
            self.longitude,
            self.distance_m,
            self.raised_at.to_rfc3339_opts(SecondsFormat::Micros, true),
        )
    }
}

/// An outbound channel for alerts.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers one alert. Called at most once per dispatch.
    ///
    /// # Errors
    ///
    /// Returns a [`DispatchError`] if delivery fails.
    async fn send(&self, alert: &Alert) -> Result<(), DispatchError>;
}

/// Sends geofence alerts, or logs them when no channel is configured.
#[derive(Clone, Default)]
pub struct AlertDispatcher {
    notifier: Option<Arc<dyn Notifier>>,
}

impl AlertDispatcher {
    /// Creates a dispatcher that delivers through `notifier`.
    #[must_use]
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier: Some(notifier),
        }
    }

    /// Creates a dispatcher that only logs alerts.
    #[must_use]
    pub const fn log_only() -> Self {
        Self { notifier: None }
    }

    /// Whether an outbound channel is configured.
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.notifier.is_some()
    }

    /// Raises an alert for `device_id` at `(lat, lon)`.
    ///
    /// `decision` is the signed decision value that made the caller alert;
    /// its magnitude is reported as the distance.
    ///
    /// # Errors
    ///
    /// Returns the notifier's [`DispatchError`] if delivery fails. An
    /// unconfigured dispatcher never fails.
    pub async fn dispatch(
        &self,
        lat: f64,
        lon: f64,
        decision: f64,
        device_id: &str,
    ) -> Result<(), DispatchError> {
        log::info!("Attempting to send notification for device {device_id}");

        let alert = Alert {
            device_id: device_id.to_string(),
            latitude: lat,
            longitude: lon,
            distance_m: decision.abs(),
            raised_at: Utc::now(),
        };

        let Some(notifier) = &self.notifier else {
            log::warn!("No alert channel configured, using mock notification");
            log::info!(
                "MOCK EMAIL: Geofence alert for device {device_id} at ({lat}, {lon}), \
                 {:.2}m from boundary",
                alert.distance_m
            );
            return Ok(());
        };

        notifier.send(&alert).await
    }
}
