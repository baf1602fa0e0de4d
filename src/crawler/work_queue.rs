//! Resumable FIFO of pending partitions
//!
//! The queue is owned by the crawler and handed through every resolution
//! step. Its serialized form (a JSON array of `[label, lower, upper]`
//! records) is the only durable crawl state besides the entity output.

use crate::partition::{KeyError, Partition, PartitionKey, PartitionRecord};
use crate::storage::{CheckpointSink, StorageResult};
use std::collections::VecDeque;

/// Serialized form of the queue
pub type QueueSnapshot = Vec<PartitionRecord>;

/// Ordered sequence of partitions awaiting resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkQueue<K: PartitionKey> {
    pending: VecDeque<Partition<K>>,
}

impl<K: PartitionKey> Default for WorkQueue<K> {
    fn default() -> Self {
        Self {
            pending: VecDeque::new(),
        }
    }
}

impl<K: PartitionKey> WorkQueue<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the queue with the full key range
    ///
    /// One partition per label, in order, or a single unlabelled partition
    /// when no labels are given.
    pub fn seeded(labels: &[String], lower: K, upper: K) -> Result<Self, KeyError> {
        let mut queue = Self::new();
        if labels.is_empty() {
            queue.push(Partition::new(None, lower, upper)?);
        }
        for label in labels {
            queue.push(Partition::new(Some(label.clone()), lower, upper)?);
        }
        Ok(queue)
    }

    /// Appends a partition at the back
    pub fn push(&mut self, partition: Partition<K>) {
        self.pending.push_back(partition);
    }

    /// Removes the partition at the front
    pub fn pop(&mut self) -> Option<Partition<K>> {
        self.pending.pop_front()
    }

    /// Enqueues the halves of a bisected partition, upper half first
    pub fn push_halves(&mut self, lower_half: Partition<K>, upper_half: Partition<K>) {
        self.push(upper_half);
        self.push(lower_half);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Partition<K>> {
        self.pending.iter()
    }

    pub fn to_snapshot(&self) -> QueueSnapshot {
        self.pending.iter().map(Partition::to_record).collect()
    }

    pub fn from_snapshot(snapshot: &[PartitionRecord]) -> Result<Self, KeyError> {
        let pending = snapshot
            .iter()
            .map(Partition::from_record)
            .collect::<Result<VecDeque<_>, _>>()?;
        Ok(Self { pending })
    }

    /// Persists the queue, replacing the previous checkpoint
    pub fn save(&self, sink: &mut dyn CheckpointSink<QueueSnapshot>) -> StorageResult<()> {
        sink.store(&self.to_snapshot())
    }

    /// Restores a queue from its checkpoint, if one exists
    pub fn load(sink: &dyn CheckpointSink<QueueSnapshot>) -> crate::Result<Option<Self>> {
        match sink.load()? {
            Some(snapshot) => Ok(Some(Self::from_snapshot(&snapshot)?)),
            None => Ok(None),
        }
    }
}
