//! Facet-Crawl main entry point
//!
//! This is the command-line interface for the Facet-Crawl catalog crawler.

use anyhow::Context;
use clap::Parser;
use facet_crawl::checkpoint::open_store;
use facet_crawl::config::{load_config_with_hash, Config, DriverKind};
use facet_crawl::crawler::crawl;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Facet-Crawl: an exhaustive faceted-catalog crawler
///
/// Facet-Crawl walks every combination of a catalog's filter facets,
/// deduplicates the products it sees and records which filters each product
/// satisfies. Progress is checkpointed after every task.
#[derive(Parser, Debug)]
#[command(name = "facet-crawl")]
#[command(version = "1.0.0")]
#[command(about = "An exhaustive faceted-catalog crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Resume from the last checkpoint (default behavior)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start a fresh crawl, discarding the checkpoint
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["stats", "export_resolved"])]
    dry_run: bool,

    /// Show statistics from the checkpoint and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export_resolved"])]
    stats: bool,

    /// Write the resolved export from the checkpoint and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    export_resolved: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else if cli.export_resolved {
        handle_export_resolved(&config)
    } else {
        handle_crawl(config, cli.fresh).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("facet_crawl=info,warn"),
            1 => EnvFilter::new("facet_crawl=debug,info"),
            2 => EnvFilter::new("facet_crawl=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Facet-Crawl Dry Run ===\n");

    println!("Crawler Configuration:");
    println!(
        "  Max concurrent contexts: {}",
        config.crawler.max_concurrent_contexts
    );
    println!("  Max retries: {}", config.crawler.max_retries);
    println!("  Task timeout: {}ms", config.crawler.task_timeout_ms);
    println!("  Extract at: {:?}", config.crawler.extract_at);

    println!("\nCatalog:");
    println!("  Root URL: {}", config.catalog.root_url);
    let catalog = config.facet_catalog()?;
    for facet in catalog.facets() {
        println!("  {}. {}", facet.order + 1, facet.title);
    }
    println!("  Fingerprint: {}", catalog.fingerprint());

    println!("\nDeduplication:");
    println!("  Volatile fields: {}", config.dedup.volatile_fields.join(", "));

    println!("\nCheckpoint:");
    println!("  Backend: {:?}", config.checkpoint.backend);
    println!("  Path: {}", config.checkpoint.path);
    if let Some(path) = &config.checkpoint.resolved_path {
        println!("  Resolved export: {}", path);
    }

    println!("\nDriver:");
    match config.driver.kind {
        DriverKind::Html => {
            println!("  Kind: html");
            println!("  Request timeout: {}ms", config.driver.request_timeout_ms);
        }
        DriverKind::Fixture => {
            println!("  Kind: fixture");
            if let Some(path) = &config.driver.fixture_path {
                println!("  Fixture: {}", path);
            }
        }
    }

    if let Some(user_agent) = &config.user_agent {
        println!("\nUser Agent:");
        println!("  Name: {}", user_agent.crawler_name);
        println!("  Version: {}", user_agent.crawler_version);
        println!("  Contact URL: {}", user_agent.contact_url);
        println!("  Contact Email: {}", user_agent.contact_email);
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would descend {} facets with up to {} contexts",
        catalog.len(),
        config.crawler.max_concurrent_contexts
    );

    Ok(())
}

/// Handles the --stats mode: shows statistics from the checkpoint
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    use facet_crawl::output::{load_statistics, print_statistics};

    println!("Checkpoint: {}\n", config.checkpoint.path);

    let store = open_store(&config.checkpoint).context("Failed to open checkpoint")?;
    let Some(snapshot) = store.load().context("Failed to read checkpoint")? else {
        println!("No checkpoint found.");
        return Ok(());
    };

    let stats = load_statistics(&snapshot);
    print_statistics(&stats);

    Ok(())
}

/// Handles the --export-resolved mode: writes items merged with their filters
fn handle_export_resolved(config: &Config) -> anyhow::Result<()> {
    let path = config
        .checkpoint
        .resolved_path
        .as_deref()
        .context("checkpoint.resolved-path is not configured")?;

    println!("=== Exporting Resolved Items ===\n");
    println!("Checkpoint: {}", config.checkpoint.path);
    println!("Output: {}", path);
    println!();

    let store = open_store(&config.checkpoint).context("Failed to open checkpoint")?;
    let snapshot = store
        .load()
        .context("Failed to read checkpoint")?
        .context("No checkpoint found")?;

    tracing::info!("Resolving {} items...", snapshot.state.items().len());
    store
        .export_resolved(&snapshot, Path::new(path))
        .context("Failed to write resolved export")?;

    println!("✓ Resolved items exported to: {}", path);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, fresh: bool) -> anyhow::Result<()> {
    if fresh {
        tracing::info!("Starting fresh crawl (discarding checkpoint)");
    } else {
        tracing::info!("Starting crawl (will resume from checkpoint if one exists)");
    }

    let report = crawl(config, fresh).await.context("Crawl failed to start")?;

    if report.complete {
        tracing::info!("Crawl completed successfully");
    } else {
        tracing::info!(
            "Crawl ended with {} abandoned tasks; re-run to resume",
            report.tasks_abandoned
        );
    }
    if report.count_mismatches > 0 || report.field_mismatches > 0 {
        tracing::warn!(
            "Data quality: {} count mismatches, {} field mismatches",
            report.count_mismatches,
            report.field_mismatches
        );
    }

    Ok(())
}
