//! Shelf-Sweep main entry point
//!
//! This is the command-line interface for the Shelf-Sweep listing harvester.

use anyhow::Context;
use clap::Parser;
use shelf_sweep::config::{load_config_with_hash, validate, Config};
use shelf_sweep::crawler::{crawl, plan_pages};
use shelf_sweep::output::print_report;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Shelf-Sweep: a paginated listing harvester
///
/// Fetches every page of the configured listings, extracts book entries or
/// question/answer pairs, and merges them into one JSON file per category.
/// Individual page failures are reported, never fatal.
#[derive(Parser, Debug)]
#[command(name = "shelf-sweep")]
#[command(version = "1.0.0")]
#[command(about = "A paginated listing harvester", long_about = None)]
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

    /// Override the number of workers
    #[arg(long, value_name = "N")]
    concurrency: Option<u32>,

    /// Override the page count of every source
    #[arg(long, value_name = "N")]
    pages: Option<u32>,

    /// Override the output directory
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Validate config and list the pages that would be fetched
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    apply_overrides(&mut config, &cli);
    if let Err(e) = validate(&config) {
        tracing::error!("Invalid command line override: {}", e);
        return Err(e.into());
    }

    let output_dir = resolve_output_dir(&config)?;

    if cli.dry_run {
        handle_dry_run(&config, output_dir)?;
    } else {
        handle_crawl(&config, output_dir).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("shelf_sweep=info,warn"),
            1 => EnvFilter::new("shelf_sweep=debug,info"),
            2 => EnvFilter::new("shelf_sweep=trace,debug"),
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

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(concurrency) = cli.concurrency {
        config.crawler.concurrency = concurrency;
    }

    if let Some(pages) = cli.pages {
        for source in &mut config.sources {
            source.pages = pages;
        }
    }

    if let Some(output) = &cli.output {
        config.output.directory = Some(output.clone());
    }
}

/// Output directory: configured, or a sibling of the executable named after it
fn resolve_output_dir(config: &Config) -> anyhow::Result<PathBuf> {
    if let Some(directory) = &config.output.directory {
        return Ok(directory.clone());
    }

    let exe = std::env::current_exe().context("cannot locate the running executable")?;
    let parent = exe
        .parent()
        .context("executable has no parent directory")?;
    let stem = exe
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "shelf-sweep".to_string());

    let directory = parent.join(stem);
    tracing::debug!("No output directory configured, using {}", directory.display());
    Ok(directory)
}

/// Handles the --dry-run mode: shows what would be crawled
fn handle_dry_run(config: &Config, output_dir: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Shelf-Sweep Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Workers: {}", config.crawler.concurrency);
    println!("  Timeout: {}s", config.crawler.timeout_secs);
    println!(
        "  Retries: {} ({}ms apart)",
        config.crawler.max_retries, config.crawler.retry_delay_ms
    );
    match config.crawler.deadline_secs {
        Some(deadline) => println!("  Deadline: {}s", deadline),
        None => println!("  Deadline: none"),
    }

    println!("\nHeaders:");
    println!("  User-Agent: {}", config.headers.user_agent);
    if !config.headers.referer.is_empty() {
        println!("  Referer: {}", config.headers.referer);
    }
    println!(
        "  Cookie: {}",
        if config.headers.cookie.is_some() { "set" } else { "none" }
    );
    println!("  Keep-alive: {}", config.headers.keep_alive);

    println!("\nOutput: {}", output_dir.display());

    let plan = plan_pages(config)?;

    println!("\nPages ({}):", plan.len());
    for job in &plan {
        println!("  [{}] {} -> {}", job.mode, job.address.url, job.address.category);
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config, output_dir: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        "Sources: {}, workers: {}, output: {}",
        config.sources.len(),
        config.crawler.concurrency,
        output_dir.display()
    );

    let report = crawl(config, output_dir).await?;

    if report.is_partial() {
        tracing::warn!(
            "Crawl finished with {} failed and {} undispatched pages",
            report.pages_failed,
            report.pages_skipped
        );
    } else {
        tracing::info!("Crawl completed successfully");
    }

    print_report(&report);
    Ok(())
}
