//! Durable storage of raw telemetry samples.

use std::collections::BTreeSet;
use std::sync::Arc;

use geotrack_store::ObjectStore;
use geotrack_telemetry_models::{StoredSample, date_from_key};

use crate::IngestError;

/// Writes samples under `{device}/{YYYY}/{MM}/{DD}/{HHMMSS}.json` keys and
/// answers which dates have data.
#[derive(Clone)]
pub struct SampleStore {
    store: Arc<dyn ObjectStore>,
}

impl SampleStore {
    /// Creates a sample store over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Writes `sample`, replacing any sample already stored under the same
    /// key. Returns the key written.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] if serialization or the write fails.
    pub async fn save(&self, sample: &StoredSample) -> Result<String, IngestError> {
        let key = sample.key();
        let body = serde_json::to_vec(sample)?;
        self.store.put(&key, body, "application/json").await?;
        log::info!("Successfully stored GPS data for device {}", sample.device_id);
        Ok(key)
    }

    /// Returns every distinct `YYYY-MM-DD` with stored samples, ascending.
    ///
    /// Scans all keys on every call.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Store`] if the listing fails.
    pub async fn list_dates(&self) -> Result<Vec<String>, IngestError> {
        let keys = self.store.list_keys("").await?;
        let dates: BTreeSet<String> = keys.iter().filter_map(|k| date_from_key(k)).collect();
        Ok(dates.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use geotrack_store::MemoryObjectStore;
    use geotrack_telemetry_models::TransportMetadata;
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn lists_distinct_sorted_dates() {
        let store = Arc::new(MemoryObjectStore::new("gps-data"));
        store.insert("b/2024/02/10/000000.json", "{}");
        store.insert("a/2024/01/02/120000.json", "{}");
        store.insert("a/2024/01/02/130000.json", "{}");
        store.insert("stray.json", "{}");

        let dates = SampleStore::new(store).list_dates().await.unwrap();
        assert_eq!(dates, vec!["2024-01-02", "2024-02-10"]);
    }

    #[tokio::test]
    async fn same_second_samples_overwrite() {
        let store = Arc::new(MemoryObjectStore::new("gps-data"));
        let samples = SampleStore::new(store.clone());
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let metadata = TransportMetadata::default();

        let first_payload = json!({"deviceId": "d", "lat": 1.0, "lon": 2.0});
        let second_payload = json!({"deviceId": "d", "lat": 3.0, "lon": 4.0});
        let first = StoredSample::capture(&first_payload, &metadata, now);
        let second = StoredSample::capture(&second_payload, &metadata, now);

        let key = samples.save(&first).await.unwrap();
        assert_eq!(samples.save(&second).await.unwrap(), key);
        assert_eq!(store.len(), 1);

        let stored: serde_json::Value =
            serde_json::from_slice(&store.get(&key).await.unwrap()).unwrap();
        assert_eq!(stored["gps"], json!({"deviceId": "d", "lat": 3.0, "lon": 4.0}));
        assert_eq!(stored["date"], "2024-01-02");
    }
}
