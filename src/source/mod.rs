//! Search sources the crawler queries
//!
//! This module defines the seams between the crawler and the outside world:
//! - `QuerySource`: issues one window-bounded search over a partition
//! - `ResultCursor`: the lazy, single-pass entity sequence of one search
//! - `QuotaObserver`: reads the remaining query quota and service status
//! - `Clock`: sleeps while quota replenishes
//!
//! Keeping them separate lets tests inject a simulated clock and quota
//! independently of the search itself.

mod github;
pub mod synthetic;

pub use github::{GithubClient, GithubCursor};
pub use synthetic::{SyntheticClock, SyntheticService};

use crate::partition::{Partition, PartitionKey};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// A retrieved search result entity, kept as raw JSON
pub type Entity = Value;

/// Errors returned by search sources
#[derive(Debug, Error)]
pub enum SourceError {
    /// Quota exhausted or request forbidden for throttling reasons
    #[error("Rate limited (HTTP {status}): {message}")]
    RateLimited { status: u16, message: String },

    /// Server-side failure
    #[error("Server error (HTTP {status})")]
    Server { status: u16 },

    /// The entity no longer exists
    #[error("Entity gone (HTTP {status}): {message}")]
    Gone { status: u16, message: String },

    /// Access to this specific entity is blocked
    #[error("Entity blocked (HTTP {status}): {message}")]
    Blocked { status: u16, message: String },

    /// A result was read past the service's result window
    #[error("Result iterated past the window: {read} of {total} read with window {window}")]
    OverIteration { read: u64, total: u64, window: u64 },

    #[error("Unexpected response (HTTP {status}): {message}")]
    Unexpected { status: u16, message: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl SourceError {
    /// Errors that clear up once quota refreshes or the service recovers
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Server { .. })
    }

    /// Errors that only concern the entity being read, not the search
    pub fn is_entity_skip(&self) -> bool {
        matches!(self, Self::Gone { .. } | Self::Blocked { .. })
    }

    /// HTTP status associated with the error, when there is one
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimited { status, .. }
            | Self::Server { status }
            | Self::Gone { status, .. }
            | Self::Blocked { status, .. }
            | Self::Unexpected { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::OverIteration { .. } | Self::Decode(_) => None,
        }
    }
}

/// Result type for source operations
pub type SourceResult<T> = Result<T, SourceError>;

/// Scan direction over the partition key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn as_param(&self) -> &'static str {
        match self {
            Self::Ascending => "asc",
            Self::Descending => "desc",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_param())
    }
}

/// The outcome of one search: the declared total and a lazy cursor
///
/// `total_count` may exceed what the service will actually let a caller
/// read. The cursor must never be advanced past the result window.
pub struct QueryResult<C> {
    pub total_count: u64,
    pub cursor: C,
}

/// Lazy, finite, single-pass entity sequence of one search
///
/// After a transient error the cursor stays on the failing entity, so the
/// next call retries it. After an entity-skip error (see
/// [`SourceError::is_entity_skip`]) the cursor has already moved past it.
#[async_trait]
pub trait ResultCursor: Send {
    async fn next_entity(&mut self) -> SourceResult<Option<Entity>>;
}

/// Issues window-bounded searches over partitions of a key domain
#[async_trait]
pub trait QuerySource<K: PartitionKey>: Send {
    type Cursor: ResultCursor;

    async fn query(
        &mut self,
        partition: &Partition<K>,
        order: SortOrder,
    ) -> SourceResult<QueryResult<Self::Cursor>>;
}

/// Snapshot of the external rate budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaStatus {
    pub remaining: u64,
    pub limit: u64,
}

/// Observes the external service's quota and health
#[async_trait]
pub trait QuotaObserver: Send {
    async fn quota(&mut self) -> SourceResult<QuotaStatus>;

    async fn service_status(&mut self) -> SourceResult<String>;
}

/// Time source used while waiting for quota
#[async_trait]
pub trait Clock: Send {
    async fn sleep(&mut self, duration: Duration);
}

/// Wall clock backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&mut self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
