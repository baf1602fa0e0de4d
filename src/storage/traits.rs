//! Sink traits and error types
//!
//! This module defines the interface every output and checkpoint backend
//! implements, and the associated error types.

use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable destination for values of type `T`
pub trait Sink<T>: Send {
    /// Records one value
    ///
    /// Append sinks add the value after everything stored before it;
    /// checkpoint sinks replace their previous content with it.
    fn store(&mut self, item: &T) -> StorageResult<()>;
}

/// A sink holding a single value that can be read back
///
/// Used for the work queue checkpoint.
pub trait CheckpointSink<T>: Sink<T> {
    /// Loads the last stored value, or `None` if nothing was stored
    fn load(&self) -> StorageResult<Option<T>>;

    /// Removes the stored value
    fn clear(&mut self) -> StorageResult<()>;
}
