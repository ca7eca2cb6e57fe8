//! Consumer groups and the two message handlers.
//!
//! A consumer group runs one task per partition. Each task handles its
//! partition's messages strictly in order; partitions proceed
//! concurrently. Handlers never return errors: whatever happens, the
//! message counts as consumed and the task moves on.

use std::sync::Arc;

use chrono::Utc;
use geotrack_telemetry_models::StoredSample;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::geofence::{GeofenceOutcome, GeofencePipeline};
use crate::samples::SampleStore;
use crate::stream::{EventHub, PartitionReader, StreamMessage};

/// Consumer group feeding the sample store.
pub const STORAGE_GROUP: &str = "$Default";

/// Consumer group feeding geofence evaluation.
pub const GEOFENCE_GROUP: &str = "geofence";

/// How a handler finished with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// The message was fully processed.
    Completed,
    /// The message was intentionally not processed (bad input).
    Skipped,
    /// Processing failed; the failure was logged.
    Failed,
}

/// Processes one message for a consumer group.
#[async_trait::async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handles `message`. Must not panic on bad input.
    async fn handle(&self, message: &StreamMessage) -> HandleOutcome;
}

/// Per-group message counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Messages fully processed.
    pub completed: u64,
    /// Messages skipped as malformed.
    pub skipped: u64,
    /// Messages whose processing failed.
    pub failed: u64,
}

impl ConsumerStats {
    /// Counts one outcome.
    pub const fn record(&mut self, outcome: HandleOutcome) {
        match outcome {
            HandleOutcome::Completed => self.completed += 1,
            HandleOutcome::Skipped => self.skipped += 1,
            HandleOutcome::Failed => self.failed += 1,
        }
    }

    /// Merge another stats into this one.
    pub const fn merge(&mut self, other: Self) {
        self.completed += other.completed;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }

    /// Total number of messages consumed.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.completed + self.skipped + self.failed
    }
}

impl std::fmt::Display for ConsumerStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} completed, {} skipped, {} failed",
            self.completed, self.skipped, self.failed
        )
    }
}

/// Running consumer group: one task per partition.
pub struct ConsumerGroup {
    name: String,
    tasks: Vec<JoinHandle<ConsumerStats>>,
}

impl ConsumerGroup {
    /// Starts a consumer group reading every partition of `hub` from the
    /// oldest retained message.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn spawn(hub: &Arc<EventHub>, name: &str, handler: Arc<dyn MessageHandler>) -> Self {
        Self::with_readers(name, open_readers(hub), handler)
    }

    /// Starts a consumer group with one task per reader.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn with_readers(
        name: &str,
        readers: Vec<PartitionReader>,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        log::info!(
            "Starting consumer group {name} on {} partition(s)",
            readers.len()
        );

        let tasks = readers
            .into_iter()
            .map(|mut reader| {
                let handler = Arc::clone(&handler);
                let group = name.to_string();
                tokio::spawn(async move {
                    let mut stats = ConsumerStats::default();
                    while let Some(message) = reader.next().await {
                        log::debug!(
                            "[{group}] partition {} offset {}",
                            message.partition,
                            message.offset
                        );
                        stats.record(handler.handle(&message).await);
                    }
                    log::debug!(
                        "[{group}] partition {} drained: {stats}",
                        reader.partition()
                    );
                    stats
                })
            })
            .collect();

        Self {
            name: name.to_string(),
            tasks,
        }
    }

    /// Group name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Waits for every partition task to finish (after the hub is closed)
    /// and returns the combined counters.
    pub async fn join(self) -> ConsumerStats {
        let mut total = ConsumerStats::default();
        for result in futures::future::join_all(self.tasks).await {
            match result {
                Ok(stats) => total.merge(stats),
                Err(e) => log::error!("[{}] partition task failed: {e}", self.name),
            }
        }
        log::info!("Consumer group {} finished: {total}", self.name);
        total
    }
}

/// Opens one reader per partition of `hub`.
#[must_use]
pub fn open_readers(hub: &Arc<EventHub>) -> Vec<PartitionReader> {
    (0..hub.partition_count())
        .map(|partition| hub.reader(partition))
        .collect()
}

fn parse_body(message: &StreamMessage) -> Option<Value> {
    match serde_json::from_slice(&message.body) {
        Ok(value) => Some(value),
        Err(e) => {
            log::error!(
                "Event processing failed: partition {} offset {} is not JSON: {e}",
                message.partition,
                message.offset
            );
            None
        }
    }
}

/// Storage path: capture every message as a stored sample.
pub struct StorageHandler {
    samples: SampleStore,
}

impl StorageHandler {
    /// Creates a handler writing to `samples`.
    #[must_use]
    pub const fn new(samples: SampleStore) -> Self {
        Self { samples }
    }
}

#[async_trait::async_trait]
impl MessageHandler for StorageHandler {
    async fn handle(&self, message: &StreamMessage) -> HandleOutcome {
        let Some(payload) = parse_body(message) else {
            return HandleOutcome::Failed;
        };

        let sample = StoredSample::capture(&payload, &message.metadata, Utc::now());
        log::info!("Processing data from device: {}", sample.device_id);

        match self.samples.save(&sample).await {
            Ok(_) => HandleOutcome::Completed,
            Err(e) => {
                log::error!("Event processing failed: {e}");
                HandleOutcome::Failed
            }
        }
    }
}

/// Geofence path: evaluate every message against the current boundary.
pub struct GeofenceHandler {
    pipeline: GeofencePipeline,
}

impl GeofenceHandler {
    /// Creates a handler running `pipeline`.
    #[must_use]
    pub const fn new(pipeline: GeofencePipeline) -> Self {
        Self { pipeline }
    }
}

#[async_trait::async_trait]
impl MessageHandler for GeofenceHandler {
    async fn handle(&self, message: &StreamMessage) -> HandleOutcome {
        let Some(payload) = parse_body(message) else {
            return HandleOutcome::Failed;
        };

        match self
            .pipeline
            .process_payload(&payload, &message.metadata)
            .await
        {
            GeofenceOutcome::MissingCoordinates => HandleOutcome::Skipped,
            GeofenceOutcome::BoundaryUnavailable { .. }
            | GeofenceOutcome::Alerted {
                delivered: false, ..
            } => HandleOutcome::Failed,
            GeofenceOutcome::NoAlert { .. } | GeofenceOutcome::Alerted { .. } => {
                HandleOutcome::Completed
            }
        }
    }
}
