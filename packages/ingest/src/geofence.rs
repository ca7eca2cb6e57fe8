//! Geofence path: extract, load boundary, evaluate, alert.
//!
//! Each event moves through
//! `Received → Extracted → BoundaryLoaded → Evaluated → (Alerted | Skipped)`.
//! Every failure along the way ends the event as skipped and is logged;
//! none is returned to the consumer loop.

use chrono::Utc;
use geotrack_alert::AlertDispatcher;
use geotrack_geofence::{BoundaryLoader, Evaluation, evaluate};
use geotrack_telemetry_models::{TelemetryEvent, TransportMetadata};
use serde_json::Value;

/// Device id used by manual geofence checks.
pub const TEST_DEVICE: &str = "test-device";

/// How a single event left the geofence path.
#[derive(Debug, Clone, PartialEq)]
pub enum GeofenceOutcome {
    /// The payload had no usable coordinates. The boundary was not loaded.
    MissingCoordinates,
    /// The boundary could not be fetched.
    BoundaryUnavailable {
        /// Why the fetch failed.
        reason: String,
    },
    /// The point was evaluated and is not alert-eligible.
    NoAlert {
        /// The evaluation.
        evaluation: Evaluation,
    },
    /// The point was alert-eligible and an alert was attempted.
    Alerted {
        /// The evaluation.
        evaluation: Evaluation,
        /// Whether the notifier accepted the alert.
        delivered: bool,
    },
}

impl GeofenceOutcome {
    /// The evaluation, if the event got that far.
    #[must_use]
    pub const fn evaluation(&self) -> Option<&Evaluation> {
        match self {
            Self::NoAlert { evaluation } | Self::Alerted { evaluation, .. } => Some(evaluation),
            Self::MissingCoordinates | Self::BoundaryUnavailable { .. } => None,
        }
    }

    /// Whether the event ended before evaluation.
    #[must_use]
    pub const fn is_skipped(&self) -> bool {
        matches!(
            self,
            Self::MissingCoordinates | Self::BoundaryUnavailable { .. }
        )
    }
}

/// Loads the boundary and alerts on alert-eligible points.
#[derive(Clone)]
pub struct GeofencePipeline {
    loader: BoundaryLoader,
    dispatcher: AlertDispatcher,
}

impl GeofencePipeline {
    /// Creates a pipeline.
    #[must_use]
    pub const fn new(loader: BoundaryLoader, dispatcher: AlertDispatcher) -> Self {
        Self { loader, dispatcher }
    }

    /// Runs the geofence path for a raw payload.
    pub async fn process_payload(
        &self,
        payload: &Value,
        metadata: &TransportMetadata,
    ) -> GeofenceOutcome {
        match TelemetryEvent::from_payload(payload, metadata, Utc::now()) {
            Ok(event) => self.process_event(&event).await,
            Err(e) => {
                log::error!("{e}");
                GeofenceOutcome::MissingCoordinates
            }
        }
    }

    /// Runs the manual check for `(lat, lon)` as [`TEST_DEVICE`].
    pub async fn check(&self, lat: f64, lon: f64) -> GeofenceOutcome {
        let event = TelemetryEvent {
            device_id: TEST_DEVICE.to_string(),
            latitude: lat,
            longitude: lon,
            received_at: Utc::now(),
        };
        self.process_event(&event).await
    }

    /// Runs the geofence path for an extracted event.
    pub async fn process_event(&self, event: &TelemetryEvent) -> GeofenceOutcome {
        let (lat, lon) = (event.latitude, event.longitude);
        log::info!(
            "Processing event from {}: lat={lat}, lon={lon}",
            event.device_id
        );

        let evaluation = match self.loader.load().await {
            Ok(boundary) => evaluate(lat, lon, &boundary),
            Err(e) if e.is_unavailable() => {
                log::error!("Skipping geofence check for {}: {e}", event.device_id);
                return GeofenceOutcome::BoundaryUnavailable {
                    reason: e.to_string(),
                };
            }
            Err(e) => {
                log::error!("Geofence error: {e}");
                Evaluation::Unevaluated
            }
        };

        let decision = evaluation.decision_value();
        if !evaluation.should_alert() {
            log::info!("Point is {decision:.2}m OUTSIDE geofence");
            return GeofenceOutcome::NoAlert { evaluation };
        }

        log::info!("Point is {:.2}m INSIDE geofence", decision.abs());
        let delivered = match self
            .dispatcher
            .dispatch(lat, lon, decision, &event.device_id)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                log::error!("Failed to send alert for {}: {e}", event.device_id);
                false
            }
        };

        GeofenceOutcome::Alerted {
            evaluation,
            delivered,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use geotrack_alert::{Alert, DispatchError, Notifier};
    use geotrack_geofence::{DEEP_INSIDE_DECISION, DEEP_OUTSIDE_DECISION};
    use geotrack_store::{MemoryObjectStore, ObjectStore, StoreError};
    use serde_json::json;

    use super::*;

    const SQUARE: &str = r#"{"type": "Polygon", "coordinates": [[
        [5.869, 36.527], [5.870, 36.527], [5.870, 36.528], [5.869, 36.528], [5.869, 36.527]
    ]]}"#;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<Alert>>,
    }

    #[async_trait::async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, alert: &Alert) -> Result<(), DispatchError> {
            self.sent.lock().unwrap().push(alert.clone());
            Ok(())
        }
    }

    /// Counts fetches and can be made to fail.
    struct CountingStore {
        inner: MemoryObjectStore,
        gets: AtomicUsize,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl ObjectStore for CountingStore {
        fn container(&self) -> &str {
            self.inner.container()
        }

        async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(StoreError::Get {
                    container: "geofences".to_string(),
                    key: key.to_string(),
                    source: "connection reset".into(),
                });
            }
            self.inner.get(key).await
        }

        async fn put(
            &self,
            key: &str,
            body: Vec<u8>,
            content_type: &str,
        ) -> Result<(), StoreError> {
            self.inner.put(key, body, content_type).await
        }

        async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
            self.inner.list_keys(prefix).await
        }
    }

    struct Fixture {
        pipeline: GeofencePipeline,
        store: Arc<CountingStore>,
        notifier: Arc<RecordingNotifier>,
    }

    fn fixture(boundary: &str, fail: bool) -> Fixture {
        let inner = MemoryObjectStore::new("geofences");
        inner.insert("geofence/geofence.json", boundary);
        let store = Arc::new(CountingStore {
            inner,
            gets: AtomicUsize::new(0),
            fail,
        });
        let notifier = Arc::new(RecordingNotifier::default());
        let pipeline = GeofencePipeline::new(
            BoundaryLoader::new(store.clone(), "geofence/geofence.json"),
            AlertDispatcher::new(notifier.clone()),
        );
        Fixture {
            pipeline,
            store,
            notifier,
        }
    }

    #[tokio::test]
    async fn alerts_once_for_deep_inside_point() {
        let f = fixture(SQUARE, false);
        let metadata = TransportMetadata {
            device_id: Some("tracker-1".to_string()),
            enqueued_time: None,
        };

        let outcome = f
            .pipeline
            .process_payload(&json!({"gps": {"lat": 36.5275, "lon": 5.8695}}), &metadata)
            .await;

        let evaluation = outcome.evaluation().unwrap();
        assert!(
            (evaluation.decision_value() - DEEP_INSIDE_DECISION).abs() < f64::EPSILON
        );
        assert!(matches!(outcome, GeofenceOutcome::Alerted { delivered: true, .. }));

        let sent = f.notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].device_id, "tracker-1");
        assert!((sent[0].latitude - 36.5275).abs() < f64::EPSILON);
        assert!((sent[0].longitude - 5.8695).abs() < f64::EPSILON);
        assert!((sent[0].distance_m - 999.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn repeated_inside_samples_alert_every_time() {
        let f = fixture(SQUARE, false);
        for _ in 0..3 {
            f.pipeline.check(36.5273, 5.86945).await;
        }
        let sent = f.notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|a| a.device_id == TEST_DEVICE));
        assert!((sent[0].distance_m - 33.3).abs() < 1e-6);
    }

    #[tokio::test]
    async fn near_outside_point_does_not_alert() {
        let f = fixture(SQUARE, false);
        let outcome = f.pipeline.check(36.5268, 5.8695).await;
        assert!(matches!(outcome, GeofenceOutcome::NoAlert { .. }));
        assert!((outcome.evaluation().unwrap().decision_value() - 22.2).abs() < 1e-6);
        assert!(f.notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_coordinates_skip_before_boundary_fetch() {
        let f = fixture(SQUARE, false);
        let outcome = f
            .pipeline
            .process_payload(
                &json!({"deviceId": "tracker-1", "gps": {"alt": 3}}),
                &TransportMetadata::default(),
            )
            .await;

        assert_eq!(outcome, GeofenceOutcome::MissingCoordinates);
        assert_eq!(f.store.gets.load(Ordering::SeqCst), 0);
        assert!(f.notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_polygon_boundary_reports_outside() {
        let f = fixture(r#"{"type": "LineString", "coordinates": [[0, 0], [1, 1]]}"#, false);
        let outcome = f.pipeline.check(36.5275, 5.8695).await;

        assert_eq!(
            outcome,
            GeofenceOutcome::NoAlert {
                evaluation: Evaluation::Unevaluated
            }
        );
        assert!(
            (outcome.evaluation().unwrap().decision_value() - DEEP_OUTSIDE_DECISION).abs()
                < f64::EPSILON
        );
        assert!(f.notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreachable_boundary_skips_event() {
        let f = fixture(SQUARE, true);
        let outcome = f.pipeline.check(36.5275, 5.8695).await;

        let GeofenceOutcome::BoundaryUnavailable { reason } = &outcome else {
            panic!("expected BoundaryUnavailable, got {outcome:?}");
        };
        assert!(reason.contains("connection reset"), "{reason}");
        assert!(outcome.is_skipped());
        assert_eq!(f.store.gets.load(Ordering::SeqCst), 1);
        assert!(f.notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn boundary_is_reloaded_for_every_event() {
        let f = fixture(SQUARE, false);
        f.pipeline.check(36.5275, 5.8695).await;
        f.pipeline.check(36.6, 5.8695).await;
        assert_eq!(f.store.gets.load(Ordering::SeqCst), 2);
    }
}
