//! In-process event hub.
//!
//! A partitioned, append-only log that stands in for the external telemetry
//! stream. Messages are routed to a partition by key, so all messages from
//! one device land in the same partition in publish order. Any number of
//! consumer groups read the log; each keeps its own offset per partition
//! and never affects another group's progress.
//!
//! Every open [`PartitionReader`] registers a cursor on its partition.
//! Messages below the lowest cursor are dropped from memory. A partition
//! with no open readers keeps its whole backlog, so a reader opened later
//! still sees it. After [`EventHub::close`], readers drain what remains and
//! then stop.

use std::collections::{BTreeMap, VecDeque};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Arc, Mutex, PoisonError};

use geotrack_telemetry_models::TransportMetadata;
use tokio::sync::watch;

/// Errors raised when publishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    /// The hub has been closed.
    #[error("Event hub is closed")]
    Closed,
}

/// One message as delivered to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMessage {
    /// Partition the message was routed to.
    pub partition: usize,
    /// Position within the partition, starting at 0.
    pub offset: usize,
    /// Raw message body.
    pub body: Vec<u8>,
    /// Transport properties.
    pub metadata: TransportMetadata,
}

#[derive(Debug, Clone, Copy, Default)]
struct PartitionState {
    len: usize,
    closed: bool,
}

/// Retained window of one partition plus the position of every open reader.
#[derive(Default)]
struct PartitionLog {
    /// Offset of `messages[0]`.
    base: usize,
    messages: VecDeque<Arc<StreamMessage>>,
    cursors: BTreeMap<u64, usize>,
    next_reader: u64,
}

impl PartitionLog {
    fn end(&self) -> usize {
        self.base + self.messages.len()
    }

    fn get(&self, offset: usize) -> Option<Arc<StreamMessage>> {
        offset
            .checked_sub(self.base)
            .and_then(|index| self.messages.get(index))
            .cloned()
    }

    fn trim(&mut self) {
        let Some(&low) = self.cursors.values().min() else {
            return;
        };
        while self.base < low && self.messages.pop_front().is_some() {
            self.base += 1;
        }
    }
}

struct Partition {
    log: Mutex<PartitionLog>,
    state: watch::Sender<PartitionState>,
}

impl Partition {
    fn new() -> Self {
        Self {
            log: Mutex::new(PartitionLog::default()),
            state: watch::Sender::new(PartitionState::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PartitionLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A partitioned in-memory message log.
pub struct EventHub {
    partitions: Vec<Partition>,
}

impl EventHub {
    /// Creates a hub with `partitions` partitions (at least one).
    #[must_use]
    pub fn new(partitions: usize) -> Arc<Self> {
        Arc::new(Self {
            partitions: (0..partitions.max(1)).map(|_| Partition::new()).collect(),
        })
    }

    /// Number of partitions.
    #[must_use]
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Partition that messages with `key` are routed to.
    #[must_use]
    pub fn partition_for(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        #[allow(clippy::cast_possible_truncation)] // reduced modulo a usize
        let index = (hasher.finish() % self.partitions.len() as u64) as usize;
        index
    }

    /// Appends a message to the partition selected by `key`.
    ///
    /// Returns the `(partition, offset)` the message was written at.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Closed`] if the hub has been closed.
    pub fn publish(
        &self,
        key: &str,
        body: Vec<u8>,
        metadata: TransportMetadata,
    ) -> Result<(usize, usize), PublishError> {
        let partition_index = self.partition_for(key);
        let partition = &self.partitions[partition_index];

        let mut log = partition.lock();

        if partition.state.borrow().closed {
            return Err(PublishError::Closed);
        }

        let offset = log.end();
        log.messages.push_back(Arc::new(StreamMessage {
            partition: partition_index,
            offset,
            body,
            metadata,
        }));
        partition.state.send_modify(|state| state.len = offset + 1);
        drop(log);

        log::debug!("Published message to partition {partition_index} at offset {offset}");
        Ok((partition_index, offset))
    }

    /// Stops accepting messages. Readers finish the remaining backlog and
    /// then return `None`.
    pub fn close(&self) {
        for partition in &self.partitions {
            let _log = partition.lock();
            partition.state.send_modify(|state| state.closed = true);
        }
        log::info!("Event hub closed");
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.partitions
            .first()
            .is_some_and(|p| p.state.borrow().closed)
    }

    /// Number of messages `partition` still holds in memory.
    ///
    /// # Panics
    ///
    /// Panics if `partition` is out of range.
    #[must_use]
    pub fn retained(&self, partition: usize) -> usize {
        self.partitions[partition].lock().messages.len()
    }

    /// Opens a reader at the oldest message `partition` still holds.
    ///
    /// # Panics
    ///
    /// Panics if `partition` is out of range.
    #[must_use]
    pub fn reader(self: &Arc<Self>, partition: usize) -> PartitionReader {
        assert!(
            partition < self.partitions.len(),
            "partition {partition} out of range"
        );
        let target = &self.partitions[partition];

        let mut log = target.lock();
        let id = log.next_reader;
        log.next_reader += 1;
        let offset = log.base;
        log.cursors.insert(id, offset);
        drop(log);

        PartitionReader {
            state: target.state.subscribe(),
            hub: Arc::clone(self),
            partition,
            id,
            offset,
        }
    }
}

/// Sequential reader over one partition with its own offset.
///
/// Holds back trimming of its partition until dropped.
pub struct PartitionReader {
    hub: Arc<EventHub>,
    partition: usize,
    id: u64,
    offset: usize,
    state: watch::Receiver<PartitionState>,
}

impl PartitionReader {
    /// Partition this reader consumes.
    #[must_use]
    pub const fn partition(&self) -> usize {
        self.partition
    }

    /// Offset of the next message to be returned.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Waits for the next message. Returns `None` once the hub is closed
    /// and every message has been read.
    pub async fn next(&mut self) -> Option<Arc<StreamMessage>> {
        loop {
            let state = *self.state.borrow_and_update();

            if state.len > self.offset {
                let mut log = self.hub.partitions[self.partition].lock();
                let message = log.get(self.offset)?;
                self.offset += 1;
                log.cursors.insert(self.id, self.offset);
                log.trim();
                return Some(message);
            }

            if state.closed {
                return None;
            }

            if self.state.changed().await.is_err() {
                return None;
            }
        }
    }
}

impl Drop for PartitionReader {
    fn drop(&mut self) {
        let mut log = self.hub.partitions[self.partition].lock();
        log.cursors.remove(&self.id);
        log.trim();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publish(hub: &EventHub, key: &str, body: &str) -> (usize, usize) {
        hub.publish(key, body.as_bytes().to_vec(), TransportMetadata::default())
            .unwrap()
    }

    #[test]
    fn routes_one_key_to_one_partition() {
        let hub = EventHub::new(8);
        let first = hub.partition_for("tracker-1");
        for _ in 0..10 {
            assert_eq!(hub.partition_for("tracker-1"), first);
        }
        assert_eq!(publish(&hub, "tracker-1", "a"), (first, 0));
        assert_eq!(publish(&hub, "tracker-1", "b"), (first, 1));
    }

    #[test]
    fn zero_partitions_is_clamped_to_one() {
        assert_eq!(EventHub::new(0).partition_count(), 1);
    }

    #[tokio::test]
    async fn readers_keep_independent_offsets() {
        let hub = EventHub::new(1);
        publish(&hub, "k", "one");
        publish(&hub, "k", "two");
        hub.close();

        let mut storage = hub.reader(0);
        let mut geofence = hub.reader(0);

        assert_eq!(storage.next().await.unwrap().body, b"one");
        assert_eq!(storage.next().await.unwrap().body, b"two");
        assert!(storage.next().await.is_none());

        assert_eq!(geofence.offset(), 0);
        assert_eq!(geofence.next().await.unwrap().body, b"one");
    }

    #[tokio::test]
    async fn reader_waits_for_new_messages() {
        let hub = EventHub::new(1);
        let mut reader = hub.reader(0);

        let publisher = Arc::clone(&hub);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            publisher
                .publish("k", b"late".to_vec(), TransportMetadata::default())
                .unwrap();
            publisher.close();
        });

        assert_eq!(reader.next().await.unwrap().body, b"late");
        assert!(reader.next().await.is_none());
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn read_messages_are_released_once_every_reader_passes() {
        let hub = EventHub::new(1);
        let mut storage = hub.reader(0);
        let mut geofence = hub.reader(0);

        for i in 0..1000 {
            publish(&hub, "k", &i.to_string());
        }
        assert_eq!(hub.retained(0), 1000);

        for _ in 0..1000 {
            storage.next().await.unwrap();
        }
        assert_eq!(hub.retained(0), 1000);

        for _ in 0..600 {
            geofence.next().await.unwrap();
        }
        assert_eq!(hub.retained(0), 400);

        for _ in 0..400 {
            geofence.next().await.unwrap();
        }
        assert_eq!(hub.retained(0), 0);

        let (_, offset) = publish(&hub, "k", "after");
        assert_eq!(offset, 1000);
        assert_eq!(storage.next().await.unwrap().offset, 1000);
        assert_eq!(geofence.next().await.unwrap().body, b"after");
        assert_eq!(hub.retained(0), 0);
    }

    #[tokio::test]
    async fn dropped_reader_stops_holding_the_backlog() {
        let hub = EventHub::new(1);
        let mut fast = hub.reader(0);
        let slow = hub.reader(0);

        for i in 0..10 {
            publish(&hub, "k", &i.to_string());
        }
        for _ in 0..10 {
            fast.next().await.unwrap();
        }
        assert_eq!(hub.retained(0), 10);

        drop(slow);
        assert_eq!(hub.retained(0), 0);
    }

    #[test]
    fn backlog_is_kept_until_a_reader_opens() {
        let hub = EventHub::new(1);
        publish(&hub, "k", "early");
        assert_eq!(hub.retained(0), 1);
        assert_eq!(hub.reader(0).offset(), 0);
    }

    #[test]
    fn publishing_after_close_fails() {
        let hub = EventHub::new(2);
        hub.close();
        assert!(hub.is_closed());
        assert_eq!(
            hub.publish("k", Vec::new(), TransportMetadata::default()),
            Err(PublishError::Closed)
        );
    }
}
