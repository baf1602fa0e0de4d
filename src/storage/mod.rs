//! Storage module for persisting harvest output
//!
//! This module handles everything the harvester writes durably:
//! - Append-only JSON Lines output of retrieved entities
//! - The overwrite-in-place work queue checkpoint
//! - In-memory equivalents of both for tests and the self-test mode

mod files;
mod memory;
mod traits;

pub use files::{AppendSink, OverwriteSink};
pub use memory::MemorySink;
pub use traits::{CheckpointSink, Sink, StorageError, StorageResult};
