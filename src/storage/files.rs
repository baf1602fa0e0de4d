//! File-backed sinks
//!
//! `AppendSink` writes one JSON document per line and never rewrites what it
//! has written. `OverwriteSink` keeps exactly one JSON document, replaced
//! atomically on every store.

use crate::storage::traits::{CheckpointSink, Sink, StorageError, StorageResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Appends one serialized item per line
#[derive(Debug)]
pub struct AppendSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl AppendSink {
    /// Opens (or creates) `path` for appending
    ///
    /// Missing parent directories are created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        ensure_parent(path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| StorageError::io(path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T: Serialize> Sink<T> for AppendSink {
    fn store(&mut self, item: &T) -> StorageResult<()> {
        serde_json::to_writer(&mut self.writer, item)?;
        self.writer
            .write_all(b"\n")
            .and_then(|_| self.writer.flush())
            .map_err(|e| StorageError::io(&self.path, e))
    }
}

/// Holds a single serialized value at a fixed path
#[derive(Debug, Clone)]
pub struct OverwriteSink {
    path: PathBuf,
}

impl OverwriteSink {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if a value is currently stored
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl<T: Serialize> Sink<T> for OverwriteSink {
    fn store(&mut self, item: &T) -> StorageResult<()> {
        ensure_parent(&self.path)?;
        let staging = self.staging_path();
        let body = serde_json::to_vec(item)?;

        // Write beside the target then rename, so a crash never leaves a torn file
        let mut file = File::create(&staging).map_err(|e| StorageError::io(&staging, e))?;
        file.write_all(&body)
            .and_then(|_| file.sync_all())
            .map_err(|e| StorageError::io(&staging, e))?;
        fs::rename(&staging, &self.path).map_err(|e| StorageError::io(&self.path, e))
    }
}

impl<T: Serialize + DeserializeOwned> CheckpointSink<T> for OverwriteSink {
    fn load(&self) -> StorageResult<Option<T>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path).map_err(|e| StorageError::io(&self.path, e))?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn clear(&mut self) -> StorageResult<()> {
        if self.path.exists() {
            fs::remove_file(&self.path).map_err(|e| StorageError::io(&self.path, e))?;
        }
        Ok(())
    }
}

fn ensure_parent(path: &Path) -> StorageResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))
        }
        _ => Ok(()),
    }
}
