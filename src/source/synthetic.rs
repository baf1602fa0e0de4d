//! Simulated search service
//!
//! `SyntheticService` serves a fixed, fully known item population so a crawl
//! can be checked for completeness end to end. It enforces the same two
//! constraints as the real service:
//! - a result window: reading past it is an `OverIteration` error, and in
//!   strict mode any read of an oversized result is
//! - a query quota: every query and every entity read costs one unit, and
//!   exhaustion answers with HTTP 403 until the `SyntheticClock` sleeps
//!
//! Faults (server errors, gone entities) can be injected to exercise the
//! crawler's recovery paths. It backs the binary's `--self-test` mode.

use crate::partition::{Partition, PartitionKey};
use crate::source::{
    Clock, Entity, QueryResult, QuerySource, QuotaObserver, QuotaStatus, ResultCursor, SortOrder,
    SourceError, SourceResult,
};
use async_trait::async_trait;
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug)]
struct State<K: PartitionKey> {
    buckets: BTreeMap<Option<String>, BTreeMap<K, u64>>,
    window: u64,
    strict: bool,
    quota_limit: u64,
    remaining: u64,
    queries: u64,
    sleeps: u64,
    failing_queries: u64,
    failing_entities: HashMap<String, u32>,
    gone: HashSet<String>,
}

/// In-process search service with a known item population
#[derive(Debug, Clone)]
pub struct SyntheticService<K: PartitionKey> {
    state: Arc<Mutex<State<K>>>,
}

impl<K: PartitionKey> SyntheticService<K> {
    /// Creates an empty service
    ///
    /// # Arguments
    ///
    /// * `window` - Maximum number of results readable from one query
    /// * `quota` - Query units available after each replenishing sleep
    pub fn new(window: u64, quota: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                buckets: BTreeMap::new(),
                window,
                strict: false,
                quota_limit: quota,
                remaining: quota,
                queries: 0,
                sleeps: 0,
                failing_queries: 0,
                failing_entities: HashMap::new(),
                gone: HashSet::new(),
            })),
        }
    }

    /// Adds items under `label`: `count` items for each `(key, count)` pair
    pub fn with_items(self, label: Option<&str>, counts: impl IntoIterator<Item = (K, u64)>) -> Self {
        {
            let mut state = self.lock();
            let bucket = state.buckets.entry(label.map(str::to_string)).or_default();
            for (key, count) in counts {
                *bucket.entry(key).or_insert(0) += count;
            }
        }
        self
    }

    /// Refuses to iterate any result whose total exceeds the window
    pub fn strict(self) -> Self {
        self.lock().strict = true;
        self
    }

    /// Marks an entity as deleted: reading it yields HTTP 410
    pub fn with_gone(self, id: &str) -> Self {
        self.lock().gone.insert(id.to_string());
        self
    }

    /// Makes reading an entity fail with HTTP 502 `times` times before succeeding
    pub fn with_flaky_entity(self, id: &str, times: u32) -> Self {
        self.lock().failing_entities.insert(id.to_string(), times);
        self
    }

    /// Makes the next `count` queries fail with HTTP 502
    pub fn fail_next_queries(&self, count: u64) {
        self.lock().failing_queries += count;
    }

    /// Drops the remaining quota to zero
    pub fn exhaust_quota(&self) {
        self.lock().remaining = 0;
    }

    /// A clock whose sleeps replenish this service's quota
    pub fn clock(&self) -> SyntheticClock<K> {
        SyntheticClock {
            state: Arc::clone(&self.state),
        }
    }

    /// Number of queries served so far
    pub fn queries(&self) -> u64 {
        self.lock().queries
    }

    /// Number of replenishing sleeps so far
    pub fn sleeps(&self) -> u64 {
        self.lock().sleeps
    }

    /// Identifiers of every readable item with a key inside `[lower, upper]`
    ///
    /// Gone entities are excluded since no crawl can retrieve them.
    pub fn expected_ids(&self, label: Option<&str>, lower: K, upper: K) -> Vec<String> {
        let state = self.lock();
        let Some(bucket) = state.buckets.get(&label.map(str::to_string)) else {
            return Vec::new();
        };
        bucket
            .range(lower..=upper)
            .flat_map(|(key, count)| (0..*count).map(move |seq| entity_id(label, *key, seq)))
            .filter(|id| !state.gone.contains(id))
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, State<K>> {
        lock_state(&self.state)
    }
}

fn lock_state<K: PartitionKey>(state: &Mutex<State<K>>) -> MutexGuard<'_, State<K>> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Identifier of the `seq`-th item stored under `key`
pub fn entity_id<K: PartitionKey>(label: Option<&str>, key: K, seq: u64) -> String {
    match label {
        Some(label) => format!("{}/{}/{}", label, key.to_checkpoint(), seq),
        None => format!("{}/{}", key.to_checkpoint(), seq),
    }
}

fn rate_limited() -> SourceError {
    SourceError::RateLimited {
        status: 403,
        message: "API rate limit exceeded".to_string(),
    }
}

#[async_trait]
impl<K: PartitionKey> QuerySource<K> for SyntheticService<K> {
    type Cursor = SyntheticCursor<K>;

    async fn query(
        &mut self,
        partition: &Partition<K>,
        order: SortOrder,
    ) -> SourceResult<QueryResult<SyntheticCursor<K>>> {
        let mut state = self.lock();
        if state.remaining == 0 {
            return Err(rate_limited());
        }
        if state.failing_queries > 0 {
            state.failing_queries -= 1;
            return Err(SourceError::Server { status: 502 });
        }
        state.remaining -= 1;
        state.queries += 1;

        let label = partition.label().map(str::to_string);
        let mut keys: Vec<(K, u64)> = state
            .buckets
            .get(&label)
            .map(|bucket| {
                bucket
                    .range(partition.lower()..=partition.upper())
                    .filter(|(_, count)| **count > 0)
                    .map(|(key, count)| (*key, *count))
                    .collect()
            })
            .unwrap_or_default();
        if order == SortOrder::Descending {
            keys.reverse();
        }
        let total = keys.iter().map(|(_, count)| count).sum();

        Ok(QueryResult {
            total_count: total,
            cursor: SyntheticCursor {
                state: Arc::clone(&self.state),
                label,
                keys,
                order,
                key_index: 0,
                item_index: 0,
                read: 0,
                total,
                window: state.window,
                strict: state.strict,
            },
        })
    }
}

#[async_trait]
impl<K: PartitionKey> QuotaObserver for SyntheticService<K> {
    async fn quota(&mut self) -> SourceResult<QuotaStatus> {
        let state = self.lock();
        Ok(QuotaStatus {
            remaining: state.remaining,
            limit: state.quota_limit,
        })
    }

    async fn service_status(&mut self) -> SourceResult<String> {
        Ok("good".to_string())
    }
}

/// Cursor over one synthetic query
#[derive(Debug)]
pub struct SyntheticCursor<K: PartitionKey> {
    state: Arc<Mutex<State<K>>>,
    label: Option<String>,
    keys: Vec<(K, u64)>,
    order: SortOrder,
    key_index: usize,
    item_index: u64,
    read: u64,
    total: u64,
    window: u64,
    strict: bool,
}

#[async_trait]
impl<K: PartitionKey> ResultCursor for SyntheticCursor<K> {
    async fn next_entity(&mut self) -> SourceResult<Option<Entity>> {
        if self.strict && self.total > self.window {
            return Err(SourceError::OverIteration {
                read: self.read + 1,
                total: self.total,
                window: self.window,
            });
        }

        while self.key_index < self.keys.len() && self.item_index >= self.keys[self.key_index].1 {
            self.key_index += 1;
            self.item_index = 0;
        }
        let Some(&(key, count)) = self.keys.get(self.key_index) else {
            return Ok(None);
        };
        if self.read >= self.window {
            return Err(SourceError::OverIteration {
                read: self.read + 1,
                total: self.total,
                window: self.window,
            });
        }

        let seq = match self.order {
            SortOrder::Ascending => self.item_index,
            SortOrder::Descending => count - 1 - self.item_index,
        };
        let id = entity_id(self.label.as_deref(), key, seq);

        let mut state = lock_state(&self.state);
        if state.remaining == 0 {
            return Err(rate_limited());
        }
        if let Some(failures) = state.failing_entities.get_mut(&id) {
            if *failures > 0 {
                *failures -= 1;
                return Err(SourceError::Server { status: 502 });
            }
        }
        state.remaining -= 1;

        self.item_index += 1;
        self.read += 1;

        if state.gone.contains(&id) {
            return Err(SourceError::Gone {
                status: 410,
                message: format!("{} was deleted", id),
            });
        }

        Ok(Some(json!({
            "id": id,
            "label": self.label,
            "key": key.to_checkpoint(),
            "seq": seq,
        })))
    }
}

/// Simulated clock: sleeping refills the service's quota instantly
#[derive(Debug, Clone)]
pub struct SyntheticClock<K: PartitionKey> {
    state: Arc<Mutex<State<K>>>,
}

#[async_trait]
impl<K: PartitionKey> Clock for SyntheticClock<K> {
    async fn sleep(&mut self, duration: Duration) {
        let mut state = lock_state(&self.state);
        tracing::debug!("Simulated sleep of {:?}, refilling quota", duration);
        state.remaining = state.quota_limit;
        state.sleeps += 1;
    }
}
