//! In-memory sink
//!
//! Keeps every stored value in order. Cloning shares the underlying buffer,
//! so a test can hand one clone to the crawler and inspect the other.

use crate::storage::traits::{CheckpointSink, Sink, StorageResult};
use std::sync::{Arc, Mutex, MutexGuard};

/// Transient ordered sink
#[derive(Debug)]
pub struct MemorySink<T> {
    items: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for MemorySink<T> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
        }
    }
}

impl<T> Default for MemorySink<T> {
    fn default() -> Self {
        Self {
            items: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T: Clone> MemorySink<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything stored so far, oldest first
    pub fn stored(&self) -> Vec<T> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<T>> {
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T: Clone + Send> Sink<T> for MemorySink<T> {
    fn store(&mut self, item: &T) -> StorageResult<()> {
        self.lock().push(item.clone());
        Ok(())
    }
}

impl<T: Clone + Send> CheckpointSink<T> for MemorySink<T> {
    fn load(&self) -> StorageResult<Option<T>> {
        Ok(self.lock().last().cloned())
    }

    fn clear(&mut self) -> StorageResult<()> {
        self.lock().clear();
        Ok(())
    }
}
