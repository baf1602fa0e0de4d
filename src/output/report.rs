//! Run report
//!
//! Counters accumulated while the crawler works through the queue, plus the
//! list of ranges it had to give up on. A run that finishes with irreducible
//! ranges is complete as far as the crawler can go, but lossy.

use std::fmt;

/// A single-key range whose result count exceeded the window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrreducibleRange {
    pub label: Option<String>,
    pub key: String,
    pub total: u64,
}

impl fmt::Display for IrreducibleRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "({}, {}): {} results", label, self.key, self.total),
            None => write!(f, "{}: {} results", self.key, self.total),
        }
    }
}

/// Summary statistics for a harvest run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    /// Partitions taken off the queue and resolved
    pub partitions_resolved: u64,

    /// Search queries that returned successfully
    pub queries: u64,

    /// Partitions that matched nothing
    pub empty_partitions: u64,

    /// Partitions split in two
    pub bisections: u64,

    /// Partitions recovered with an ascending and a descending scan
    pub merges: u64,

    /// Entities written to the output sink
    pub entities_stored: u64,

    /// Entities skipped because they were gone or blocked
    pub entities_skipped: u64,

    /// Transient failures that were waited out and retried
    pub retries: u64,

    /// Ranges abandoned because a single key exceeds the window
    pub irreducible: Vec<IrreducibleRange>,
}

impl CrawlReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no range had to be abandoned
    pub fn is_complete(&self) -> bool {
        self.irreducible.is_empty()
    }

    /// Number of results that could not be retrieved, as declared by the service
    pub fn results_abandoned(&self) -> u64 {
        self.irreducible.iter().map(|r| r.total).sum()
    }
}

/// Prints the report to stdout in a formatted manner
pub fn print_report(report: &CrawlReport) {
    println!("=== Harvest Report ===\n");

    println!("Partitions:");
    println!("  Resolved: {}", report.partitions_resolved);
    println!("  Empty: {}", report.empty_partitions);
    println!("  Bisected: {}", report.bisections);
    println!("  Merged (two-sided scan): {}", report.merges);
    println!();

    println!("Entities:");
    println!("  Stored: {}", report.entities_stored);
    println!("  Skipped: {}", report.entities_skipped);
    println!();

    println!("Service:");
    println!("  Queries: {}", report.queries);
    println!("  Retries: {}", report.retries);

    if !report.is_complete() {
        println!();
        println!(
            "Irreducible ranges ({}, {} results not retrieved):",
            report.irreducible.len(),
            report.results_abandoned()
        );
        for range in &report.irreducible {
            println!("  - {}", range);
        }
    }
}
