#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Telemetry ingestion.
//!
//! Every message published to the [`EventHub`](stream::EventHub) is read
//! by two independent consumer groups: one stores the raw sample, the
//! other evaluates it against the geofence and raises alerts. A failure
//! in one path never affects the other.

pub mod config;
pub mod consumer;
pub mod geofence;
pub mod samples;
pub mod stream;

use std::sync::Arc;

use geotrack_alert::{AlertDispatcher, SendGridNotifier};
use geotrack_geofence::BoundaryLoader;
use geotrack_store::{
    LocalObjectStore, MemoryObjectStore, ObjectStore, S3ObjectStore, StoreError,
};
use geotrack_telemetry_models::{TransportMetadata, resolve_device_id};
use serde_json::Value;

use crate::config::{Config, StorageBackend};
use crate::consumer::{
    ConsumerGroup, ConsumerStats, GEOFENCE_GROUP, GeofenceHandler, STORAGE_GROUP,
    StorageHandler, open_readers,
};
use crate::geofence::GeofencePipeline;
use crate::samples::SampleStore;
use crate::stream::{EventHub, PublishError};

/// Errors raised by the storage path.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// A sample could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Object storage failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The two processing paths, wired to their backends.
#[derive(Clone)]
pub struct Services {
    /// Raw sample storage.
    pub samples: SampleStore,
    /// Geofence evaluation and alerting.
    pub geofence: GeofencePipeline,
}

impl Services {
    /// Connects both paths to the backends named in `config`.
    pub async fn from_config(config: &Config) -> Self {
        let (samples, boundaries): (Arc<dyn ObjectStore>, Arc<dyn ObjectStore>) =
            match &config.storage {
                StorageBackend::S3(settings) => {
                    log::info!("Connecting to S3-compatible storage...");
                    let client = S3ObjectStore::connect(settings).await;
                    (
                        Arc::new(S3ObjectStore::new(
                            client.clone(),
                            config.samples_container.clone(),
                        )),
                        Arc::new(S3ObjectStore::new(
                            client,
                            config.geofence_container.clone(),
                        )),
                    )
                }
                StorageBackend::Local { root } => {
                    log::info!("Using local storage at {}", root.display());
                    (
                        Arc::new(LocalObjectStore::new(root, config.samples_container.clone())),
                        Arc::new(LocalObjectStore::new(root, config.geofence_container.clone())),
                    )
                }
                StorageBackend::Memory => {
                    log::warn!("Using in-memory storage; nothing will be persisted");
                    (
                        Arc::new(MemoryObjectStore::new(config.samples_container.clone())),
                        Arc::new(MemoryObjectStore::new(config.geofence_container.clone())),
                    )
                }
            };

        let dispatcher = config.sendgrid.clone().map_or_else(
            || {
                log::info!("No email provider configured; alerts will be logged");
                AlertDispatcher::log_only()
            },
            |settings| AlertDispatcher::new(Arc::new(SendGridNotifier::new(settings))),
        );

        Self::new(
            samples,
            BoundaryLoader::new(boundaries, config.geofence_key.clone()),
            dispatcher,
        )
    }

    /// Wires both paths to explicit backends.
    #[must_use]
    pub fn new(
        samples: Arc<dyn ObjectStore>,
        loader: BoundaryLoader,
        dispatcher: AlertDispatcher,
    ) -> Self {
        Self {
            samples: SampleStore::new(samples),
            geofence: GeofencePipeline::new(loader, dispatcher),
        }
    }
}

/// Both consumer groups running against one hub.
pub struct Pipeline {
    storage: ConsumerGroup,
    geofence: ConsumerGroup,
}

impl Pipeline {
    /// Starts the storage and geofence consumer groups on `hub`.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn start(hub: &Arc<EventHub>, services: &Services) -> Self {
        // Both groups hold a cursor before either starts trimming the backlog.
        let storage_readers = open_readers(hub);
        let geofence_readers = open_readers(hub);

        Self {
            storage: ConsumerGroup::with_readers(
                STORAGE_GROUP,
                storage_readers,
                Arc::new(StorageHandler::new(services.samples.clone())),
            ),
            geofence: ConsumerGroup::with_readers(
                GEOFENCE_GROUP,
                geofence_readers,
                Arc::new(GeofenceHandler::new(services.geofence.clone())),
            ),
        }
    }

    /// Waits for both groups to drain a closed hub.
    ///
    /// Returns `(storage, geofence)` counters.
    pub async fn join(self) -> (ConsumerStats, ConsumerStats) {
        futures::join!(self.storage.join(), self.geofence.join())
    }
}

/// Publishes a JSON payload, partitioned by its resolved device id.
///
/// # Errors
///
/// Returns [`PublishError::Closed`] if the hub has been closed.
pub fn publish_payload(
    hub: &EventHub,
    payload: &Value,
    metadata: TransportMetadata,
) -> Result<(usize, usize), PublishError> {
    let key = resolve_device_id(&metadata, payload);
    let body = payload.to_string().into_bytes();
    hub.publish(&key, body, metadata)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn memory_backend_runs_end_to_end() {
        let config = Config {
            storage: StorageBackend::Memory,
            samples_container: "gps-data".to_string(),
            geofence_container: "geofences".to_string(),
            geofence_key: "geofence/geofence.json".to_string(),
            sendgrid: None,
            partitions: 2,
            bind_addr: "127.0.0.1".to_string(),
            port: 0,
        };
        let services = Services::from_config(&config).await;
        let hub = EventHub::new(config.partitions);
        let pipeline = Pipeline::start(&hub, &services);

        publish_payload(
            &hub,
            &json!({"deviceId": "tracker-1", "gps": {"lat": 36.5273, "lon": 5.86945}}),
            TransportMetadata::default(),
        )
        .unwrap();
        hub.close();

        let (storage, geofence) = pipeline.join().await;
        assert_eq!(storage.completed, 1);
        // No boundary has been uploaded to the memory backend.
        assert_eq!(geofence.failed, 1);
        assert_eq!(services.samples.list_dates().await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn backlog_published_before_start_reaches_both_groups() {
        let services = Services::new(
            Arc::new(MemoryObjectStore::new("gps-data")),
            BoundaryLoader::new(
                Arc::new(MemoryObjectStore::new("geofences")),
                "geofence/geofence.json",
            ),
            AlertDispatcher::log_only(),
        );
        let hub = EventHub::new(1);
        for i in 0..50 {
            publish_payload(
                &hub,
                &json!({"deviceId": format!("tracker-{i}"), "lat": 36.5, "lon": 5.8}),
                TransportMetadata::default(),
            )
            .unwrap();
        }

        let pipeline = Pipeline::start(&hub, &services);
        hub.close();

        let (storage, geofence) = pipeline.join().await;
        assert_eq!(storage.total(), 50);
        assert_eq!(geofence.total(), 50);
        assert_eq!(hub.retained(0), 0);
    }

    #[test]
    fn publish_routes_by_resolved_device() {
        let hub = EventHub::new(8);
        let payload = json!({"deviceId": "from-body", "lat": 1.0, "lon": 2.0});

        let (partition, _) =
            publish_payload(&hub, &payload, TransportMetadata::default()).unwrap();
        assert_eq!(partition, hub.partition_for("from-body"));

        let metadata = TransportMetadata {
            device_id: Some("from-transport".to_string()),
            enqueued_time: None,
        };
        let (partition, _) = publish_payload(&hub, &payload, metadata).unwrap();
        assert_eq!(partition, hub.partition_for("from-transport"));
    }

    #[tokio::test]
    async fn local_backend_creates_container_directories() {
        let root = std::env::temp_dir().join(format!("geotrack-ingest-{}", std::process::id()));
        let config = Config {
            storage: StorageBackend::Local { root: root.clone() },
            samples_container: "gps-data".to_string(),
            geofence_container: "geofences".to_string(),
            geofence_key: "geofence/geofence.json".to_string(),
            sendgrid: None,
            partitions: 1,
            bind_addr: "127.0.0.1".to_string(),
            port: 0,
        };
        let services = Services::from_config(&config).await;
        assert!(services.samples.list_dates().await.unwrap().is_empty());

        let sample = geotrack_telemetry_models::StoredSample::capture(
            &json!({"deviceId": "d", "lat": 1.0, "lon": 2.0}),
            &TransportMetadata::default(),
            chrono::Utc::now(),
        );
        let key = services.samples.save(&sample).await.unwrap();
        assert!(PathBuf::from(&root).join("gps-data").join(&key).exists());

        std::fs::remove_dir_all(&root).unwrap();
    }
}
