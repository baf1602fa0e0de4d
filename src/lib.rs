//! Bisect-Harvest: exhaustive enumeration behind a capped search API
//!
//! This crate retrieves the complete result set of a search whose API only
//! ever returns a bounded window of results per query and throttles query
//! volume. It recursively splits the range of an ordering key (stars, dates)
//! until every slice fits the window, waits out quota exhaustion, and
//! checkpoints its work queue after every step so an interrupted run resumes
//! where it stopped.

pub mod config;
pub mod crawler;
pub mod output;
pub mod partition;
pub mod source;
pub mod storage;

use thiserror::Error;

/// Main error type for Bisect-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Search source error: {0}")]
    Source(#[from] source::SourceError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Partition key error: {0}")]
    Key(#[from] partition::KeyError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Bisect-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Crawler, QuotaGate, WorkQueue};
pub use output::CrawlReport;
pub use partition::{Partition, PartitionKey};
pub use source::{QuerySource, SortOrder};
