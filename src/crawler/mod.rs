//! Crawler module for range-partitioned harvesting
//!
//! This module contains the core harvesting logic, including:
//! - The quota gate that waits out query budget exhaustion
//! - The resumable work queue of pending partitions
//! - The partition crawler that resolves, splits and checkpoints
//! - Wiring a configured run and the built-in self-test

mod coordinator;
mod quota;
mod work_queue;

pub use coordinator::{CrawlSettings, Crawler, EmitStats, Resolution};
pub use quota::QuotaGate;
pub use work_queue::{QueueSnapshot, WorkQueue};

use crate::config::{Config, KeyType, SearchConfig};
use crate::output::{prepare_run_output, CrawlReport};
use crate::partition::PartitionKey;
use crate::source::{GithubClient, SyntheticService, TokioClock};
use crate::storage::{AppendSink, CheckpointSink, MemorySink, OverwriteSink};
use chrono::{Local, NaiveDate};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Lower bound of the self-test key range
pub const SELF_TEST_LOWER: i64 = 10;

/// Upper bound of the self-test key range
pub const SELF_TEST_UPPER: i64 = 10000;

/// Result window of the self-test service
pub const SELF_TEST_WINDOW: u64 = 1000;

/// Quota of the self-test service between replenishing sleeps
pub const SELF_TEST_QUOTA: u64 = 300;

/// Items stored under every key of the self-test population
pub const SELF_TEST_ITEMS_PER_KEY: u64 = 7;

/// Runs a complete harvest as configured
///
/// This is the main entry point for a run. It will:
/// 1. Build the search client
/// 2. Resume the checkpointed queue, or seed a new one
/// 3. Open a timestamped output file and repoint `latest`
/// 4. Process the queue until it is empty
///
/// # Arguments
///
/// * `config` - The harvester configuration
/// * `token` - Optional API token
/// * `fresh` - Ignore an existing queue checkpoint and seed again
pub async fn harvest(config: &Config, token: Option<String>, fresh: bool) -> crate::Result<CrawlReport> {
    match config.search.key_type {
        KeyType::Integer => harvest_keys::<i64>(config, token, fresh).await,
        KeyType::Date => harvest_keys::<NaiveDate>(config, token, fresh).await,
    }
}

async fn harvest_keys<K: PartitionKey>(
    config: &Config,
    token: Option<String>,
    fresh: bool,
) -> crate::Result<CrawlReport> {
    let client = GithubClient::new(config, token)?;
    let mut checkpoint = OverwriteSink::new(Path::new(&config.output.queue_path));

    let resumed = if fresh {
        tracing::info!("Starting fresh: discarding any queue checkpoint");
        CheckpointSink::<QueueSnapshot>::clear(&mut checkpoint)?;
        None
    } else {
        WorkQueue::<K>::load(&checkpoint)?.filter(|queue| !queue.is_empty())
    };

    let queue = match resumed {
        Some(queue) => {
            tracing::info!(
                "Resuming from {} with {} pending partitions",
                checkpoint.path().display(),
                queue.len()
            );
            queue
        }
        None => {
            let queue = seed_queue::<K>(&config.search)?;
            tracing::info!("Seeded queue with {} partitions", queue.len());
            queue
        }
    };

    let output_path = prepare_run_output(
        Path::new(&config.output.directory),
        &config.output.prefix,
        Local::now(),
    )?;
    let output = AppendSink::open(&output_path)?;

    let gate = QuotaGate::from_config(client.clone(), TokioClock, &config.quota);
    let mut crawler = Crawler::new(
        client,
        gate,
        Box::new(output),
        Box::new(checkpoint),
        config.search.settings(),
    );
    crawler.run(queue).await
}

/// Builds the initial queue from the `[search]` section
pub fn seed_queue<K: PartitionKey>(search: &SearchConfig) -> crate::Result<WorkQueue<K>> {
    let lower = K::from_checkpoint(&search.lower)?;
    let upper = K::from_checkpoint(&search.upper)?;
    Ok(WorkQueue::seeded(&search.labels, lower, upper)?)
}

/// Renders the seed partitions of a configuration, for dry runs
pub fn describe_seeds(search: &SearchConfig) -> crate::Result<Vec<String>> {
    fn render<K: PartitionKey>(search: &SearchConfig) -> crate::Result<Vec<String>> {
        Ok(seed_queue::<K>(search)?.iter().map(|p| p.to_string()).collect())
    }

    match search.key_type {
        KeyType::Integer => render::<i64>(search),
        KeyType::Date => render::<NaiveDate>(search),
    }
}

/// Outcome of the built-in self-test
#[derive(Debug, Clone)]
pub struct SelfTestOutcome {
    pub report: CrawlReport,
    pub stored: usize,
    pub expected: usize,
    pub missing: usize,
}

impl SelfTestOutcome {
    /// True when every expected item was stored and nothing else was
    pub fn passed(&self) -> bool {
        self.stored == self.expected && self.missing == 0
    }
}

/// Harvests a simulated service and compares against its known population
///
/// The service holds 7 items per key on `[0, 10100)`, answers at most 1000
/// results per query, refuses to iterate anything larger, and grants 300
/// queries between sleeps. The crawl covers `[10, 10000]`.
pub async fn run_self_test() -> crate::Result<SelfTestOutcome> {
    let service = SyntheticService::new(SELF_TEST_WINDOW, SELF_TEST_QUOTA)
        .with_items(None, (0i64..10100).map(|k| (k, SELF_TEST_ITEMS_PER_KEY)))
        .strict();
    let output = MemorySink::new();

    let gate = QuotaGate::new(
        service.clone(),
        service.clock(),
        10,
        Duration::from_secs(600),
    );
    let mut crawler = Crawler::new(
        service.clone(),
        gate,
        Box::new(output.clone()),
        Box::new(MemorySink::<QueueSnapshot>::new()),
        CrawlSettings {
            window: SELF_TEST_WINDOW,
            merge_near_fits: false,
        },
    );

    let queue = WorkQueue::seeded(&[], SELF_TEST_LOWER, SELF_TEST_UPPER)?;
    let report = crawler.run(queue).await?;

    let stored: Vec<String> = output
        .stored()
        .iter()
        .filter_map(|entity| entity.get("id").and_then(|id| id.as_str()).map(str::to_string))
        .collect();
    let expected = service.expected_ids(None, SELF_TEST_LOWER, SELF_TEST_UPPER);

    let stored_set: HashSet<&String> = stored.iter().collect();
    let missing = expected.iter().filter(|id| !stored_set.contains(id)).count();

    Ok(SelfTestOutcome {
        report,
        stored: output.len(),
        expected: expected.len(),
        missing,
    })
}
