//! Bisect-Harvest main entry point
//!
//! This is the command-line interface for the Bisect-Harvest search enumerator.

use anyhow::{bail, Context};
use bisect_harvest::config::{load_config_with_hash, Config};
use bisect_harvest::crawler::{describe_seeds, harvest, run_self_test};
use bisect_harvest::output::print_report;
use clap::Parser;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Bisect-Harvest: exhaustive enumeration behind a capped search API
///
/// Bisect-Harvest retrieves every result of a search whose API returns at
/// most a fixed window of results per query. It splits the configured key
/// range until each slice fits, waits out rate limits, and checkpoints its
/// work queue so an interrupted run picks up where it stopped.
#[derive(Parser, Debug)]
#[command(name = "bisect-harvest")]
#[command(version = "1.0.0")]
#[command(about = "Exhaustive enumeration behind a capped search API", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG", required_unless_present = "self_test")]
    config: Option<PathBuf>,

    /// API token sent as a bearer credential
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Resume an interrupted harvest (default behavior)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start a fresh harvest, discarding the queue checkpoint
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Validate config and show the seed partitions without querying
    #[arg(long, conflicts_with = "self_test")]
    dry_run: bool,

    /// Harvest a simulated service and verify nothing was missed
    #[arg(long)]
    self_test: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.self_test {
        setup_logging(cli.verbose, cli.quiet, None)?;
        return handle_self_test().await;
    }

    let Some(config_path) = cli.config.as_deref() else {
        bail!("a configuration file is required");
    };

    let (config, config_hash) = load_config_with_hash(config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    setup_logging(
        cli.verbose,
        cli.quiet,
        config.output.log_path.as_deref().map(Path::new),
    )?;
    tracing::info!(
        "Configuration loaded from {} (hash: {})",
        config_path.display(),
        config_hash
    );

    if cli.dry_run {
        handle_dry_run(&config)
    } else {
        handle_harvest(&config, cli.token, cli.fresh).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// When `log_path` is set, log lines are appended to that file instead of
/// stderr.
fn setup_logging(verbose: u8, quiet: bool, log_path: Option<&Path>) -> anyhow::Result<()> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("bisect_harvest=info,warn"),
            1 => EnvFilter::new("bisect_harvest=debug,info"),
            2 => EnvFilter::new("bisect_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false);

    match log_path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }

    Ok(())
}

/// Handles the --dry-run mode: validates config and shows the seed partitions
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Bisect-Harvest Dry Run ===\n");

    println!("API:");
    println!("  Base URL: {}", config.api.base_url);
    println!(
        "  Status URL: {}",
        config.api.status_url.as_deref().unwrap_or("(none)")
    );
    println!("  Page size: {}", config.api.page_size);
    println!("  Complete entities: {}", config.api.complete_entities);

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);
    println!("  Contact Email: {}", config.user_agent.contact_email);

    println!("\nQuota:");
    println!("  Resource: {:?}", config.quota.resource);
    println!("  Threshold: {}", config.quota.threshold);
    println!("  Wait: {}s", config.quota.wait_secs);

    println!("\nSearch:");
    println!("  Endpoint: {}", config.search.endpoint.as_path());
    println!("  Field: {} ({:?})", config.search.field, config.search.key_type);
    println!("  Sort: {}", config.search.sort_field());
    println!(
        "  Qualifiers: {}",
        config.search.qualifiers.as_deref().unwrap_or("(none)")
    );
    println!("  Window: {}", config.search.window);
    println!("  Merge near fits: {}", config.search.merge_near_fits);

    println!("\nOutput:");
    println!("  Directory: {}", config.output.directory);
    println!("  Prefix: {}", config.output.prefix);
    println!("  Queue: {}", config.output.queue_path);

    let seeds = describe_seeds(&config.search)?;
    println!("\nSeed Partitions ({}):", seeds.len());
    for seed in &seeds {
        println!("  - {}", seed);
    }

    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the --self-test mode
async fn handle_self_test() -> anyhow::Result<()> {
    tracing::info!("Running self-test against a simulated search service");

    let outcome = run_self_test().await.context("Self-test harvest failed")?;
    print_report(&outcome.report);

    if !outcome.passed() {
        bail!(
            "Self-test failed: stored {} of {} expected entities, {} missing",
            outcome.stored,
            outcome.expected,
            outcome.missing
        );
    }

    println!("\n✓ Self-test OK: {} entities harvested", outcome.stored);
    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(config: &Config, token: Option<String>, fresh: bool) -> anyhow::Result<()> {
    if fresh {
        tracing::info!("Starting fresh harvest (discarding queue checkpoint)");
    } else {
        tracing::info!("Starting harvest (will resume if a queue checkpoint exists)");
    }
    if token.is_none() {
        tracing::warn!("No API token given; the unauthenticated quota is much smaller");
    }

    let report = match harvest(config, token, fresh).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("Harvest failed: {}", e);
            return Err(e.into());
        }
    };

    print_report(&report);
    Ok(())
}
