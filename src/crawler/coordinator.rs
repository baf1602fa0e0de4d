//! Partition crawler - the main harvest loop
//!
//! This module resolves partitions one at a time:
//! - Throttling on the quota gate before each probe
//! - Probing the partition's total with an ascending query
//! - Emitting everything when the total fits the window
//! - Recovering moderately oversized partitions with a second, descending scan
//! - Bisecting everything larger, or abandoning single-key ranges with a warning
//! - Checkpointing the work queue after every resolution

use crate::crawler::quota::QuotaGate;
use crate::crawler::work_queue::{QueueSnapshot, WorkQueue};
use crate::output::{CrawlReport, IrreducibleRange};
use crate::partition::{Partition, PartitionKey};
use crate::source::{
    Clock, Entity, QueryResult, QuerySource, QuotaObserver, ResultCursor, SortOrder,
};
use crate::storage::{CheckpointSink, Sink};
use std::marker::PhantomData;

/// Tunables of the resolution algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlSettings {
    /// Maximum number of results the service lets one query read
    pub window: u64,

    /// Recover partitions of up to twice the window with two opposite scans
    pub merge_near_fits: bool,
}

/// Counters for one emission pass over a cursor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitStats {
    /// Entities consumed from the cursor, including skipped ones
    pub read: u64,
    pub stored: u64,
    pub skipped: u64,
}

/// How a partition was resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<K: PartitionKey> {
    /// Nothing matched
    Empty,

    /// Everything fit in one window
    Emitted(EmitStats),

    /// Recovered with an ascending and a descending scan
    Merged {
        ascending: EmitStats,
        descending: EmitStats,
    },

    /// Too large: replaced by its two halves
    Bisected {
        lower_half: Partition<K>,
        upper_half: Partition<K>,
    },

    /// Too large and a single key wide: abandoned
    Irreducible { total: u64 },
}

/// Drives partitions from the work queue to resolution
pub struct Crawler<K, S, O, C>
where
    K: PartitionKey,
    S: QuerySource<K>,
    O: QuotaObserver,
    C: Clock,
{
    source: S,
    gate: QuotaGate<O, C>,
    output: Box<dyn Sink<Entity>>,
    checkpoint: Box<dyn CheckpointSink<QueueSnapshot>>,
    settings: CrawlSettings,
    report: CrawlReport,
    _key: PhantomData<K>,
}

impl<K, S, O, C> Crawler<K, S, O, C>
where
    K: PartitionKey,
    S: QuerySource<K>,
    O: QuotaObserver,
    C: Clock,
{
    /// Creates a crawler
    ///
    /// # Arguments
    ///
    /// * `source` - Where searches are issued
    /// * `gate` - Quota gate consulted before each probe and after transient errors
    /// * `output` - Receives every retrieved entity
    /// * `checkpoint` - Receives the work queue after every step
    /// * `settings` - Window size and merge behavior
    pub fn new(
        source: S,
        gate: QuotaGate<O, C>,
        output: Box<dyn Sink<Entity>>,
        checkpoint: Box<dyn CheckpointSink<QueueSnapshot>>,
        settings: CrawlSettings,
    ) -> Self {
        Self {
            source,
            gate,
            output,
            checkpoint,
            settings,
            report: CrawlReport::new(),
            _key: PhantomData,
        }
    }

    /// Processes the queue until it is empty
    ///
    /// The queue is checkpointed once up front and after every step. Once it
    /// drains, the checkpoint is removed. Any fatal error stops processing
    /// immediately, leaving the last checkpoint in place for a restart.
    pub async fn run(&mut self, mut queue: WorkQueue<K>) -> crate::Result<CrawlReport> {
        tracing::info!("Starting harvest with {} pending partitions", queue.len());
        queue.save(&mut *self.checkpoint)?;

        while !queue.is_empty() {
            queue = self.step(queue).await?;

            if self.report.partitions_resolved % 10 == 0 {
                tracing::info!(
                    "Progress: {} partitions resolved, {} pending, {} entities stored",
                    self.report.partitions_resolved,
                    queue.len(),
                    self.report.entities_stored
                );
            }
        }

        self.checkpoint.clear()?;

        if self.report.is_complete() {
            tracing::info!(
                "Harvest complete: {} entities stored from {} queries",
                self.report.entities_stored,
                self.report.queries
            );
        } else {
            tracing::warn!(
                "Harvest finished but incomplete: {} irreducible ranges, {} results not retrieved",
                self.report.irreducible.len(),
                self.report.results_abandoned()
            );
        }

        Ok(self.report.clone())
    }

    /// Resolves the partition at the front of the queue and checkpoints
    ///
    /// Returns the updated queue. An empty queue is returned unchanged.
    pub async fn step(&mut self, mut queue: WorkQueue<K>) -> crate::Result<WorkQueue<K>> {
        let Some(partition) = queue.pop() else {
            return Ok(queue);
        };

        let resolution = self.resolve(&partition).await?;
        self.report.partitions_resolved += 1;

        match resolution {
            Resolution::Empty => self.report.empty_partitions += 1,
            Resolution::Emitted(_) => {}
            Resolution::Merged { .. } => self.report.merges += 1,
            Resolution::Bisected {
                lower_half,
                upper_half,
            } => {
                self.report.bisections += 1;
                queue.push_halves(lower_half, upper_half);
            }
            Resolution::Irreducible { total } => {
                self.report.irreducible.push(IrreducibleRange {
                    label: partition.label().map(str::to_string),
                    key: partition.lower().to_checkpoint(),
                    total,
                });
            }
        }

        queue.save(&mut *self.checkpoint)?;
        tracing::debug!("Checkpointed {} pending partitions", queue.len());
        Ok(queue)
    }

    /// Applies the resolution algorithm to one partition
    ///
    /// Entities are written to the output sink as they are read. The
    /// returned resolution tells the caller what to do with the queue.
    pub async fn resolve(&mut self, partition: &Partition<K>) -> crate::Result<Resolution<K>> {
        tracing::info!("Descending into: {}", partition);
        self.gate.await_capacity().await?;

        let QueryResult {
            total_count: total,
            mut cursor,
        } = self.query(partition, SortOrder::Ascending).await?;
        let window = self.settings.window;

        if total == 0 {
            return Ok(Resolution::Empty);
        }

        if total <= window {
            let stats = self.emit(partition, &mut cursor, total).await?;
            return Ok(Resolution::Emitted(stats));
        }

        if self.settings.merge_near_fits && total <= window.saturating_mul(2) {
            let ascending = self.emit(partition, &mut cursor, window).await?;
            drop(cursor);

            let QueryResult {
                total_count: descending_total,
                cursor: mut descending_cursor,
            } = self.query(partition, SortOrder::Descending).await?;
            if descending_total != total {
                tracing::warn!(
                    "Total for {} changed between scans: {} ascending, {} descending",
                    partition,
                    total,
                    descending_total
                );
            }

            let remaining = total.saturating_sub(ascending.read).min(window);
            let descending = self
                .emit(partition, &mut descending_cursor, remaining)
                .await?;
            return Ok(Resolution::Merged {
                ascending,
                descending,
            });
        }

        match partition.bisect() {
            Some((lower_half, upper_half)) => {
                tracing::debug!(
                    "{} has {} results, splitting into {} and {}",
                    partition,
                    total,
                    lower_half,
                    upper_half
                );
                Ok(Resolution::Bisected {
                    lower_half,
                    upper_half,
                })
            }
            None => {
                tracing::warn!(
                    "Can not bisect further: {} has {} results, only {} retrievable; abandoning",
                    partition,
                    total,
                    window
                );
                Ok(Resolution::Irreducible { total })
            }
        }
    }

    /// Issues a query, waiting out transient failures
    async fn query(
        &mut self,
        partition: &Partition<K>,
        order: SortOrder,
    ) -> crate::Result<QueryResult<S::Cursor>> {
        loop {
            match self.source.query(partition, order).await {
                Ok(result) => {
                    self.report.queries += 1;
                    return Ok(result);
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!(
                        status = ?e.status(),
                        "Query for {} ({}) failed with {}; waiting before retry",
                        partition,
                        order,
                        e
                    );
                    self.report.retries += 1;
                    self.gate.backoff().await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Streams up to `limit` entities from `cursor` into the output sink
    ///
    /// Skipped entities count toward the limit, since they occupied a slot of
    /// the result window.
    async fn emit(
        &mut self,
        partition: &Partition<K>,
        cursor: &mut S::Cursor,
        limit: u64,
    ) -> crate::Result<EmitStats> {
        tracing::info!("Saving at most {} results of {}", limit, partition);
        let mut stats = EmitStats::default();

        while stats.read < limit {
            match cursor.next_entity().await {
                Ok(Some(entity)) => {
                    self.output.store(&entity)?;
                    stats.read += 1;
                    stats.stored += 1;
                }
                Ok(None) => break,
                Err(e) if e.is_entity_skip() => {
                    tracing::warn!("Skipping entity {} of {}: {}", stats.read + 1, partition, e);
                    stats.read += 1;
                    stats.skipped += 1;
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!(
                        status = ?e.status(),
                        "Reading entity {} of {} failed with {}; waiting before retry",
                        stats.read + 1,
                        partition,
                        e
                    );
                    self.report.retries += 1;
                    self.gate.backoff().await?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.report.entities_stored += stats.stored;
        self.report.entities_skipped += stats.skipped;
        tracing::info!("Saved {} results ({} skipped)", stats.stored, stats.skipped);
        Ok(stats)
    }
}
