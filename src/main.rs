//! Shelfwatch main entry point
//!
//! This is the command-line interface for the Shelfwatch product change tracker.

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::Parser;
use shelfwatch::config::{load_config_with_hash, Config};
use shelfwatch::crawler::Runner;
use shelfwatch::output::print_run_summary;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Shelfwatch: a polite product change tracker
///
/// Shelfwatch crawls configured product listings while respecting robots.txt and
/// per-host rate limits, stores a normalized snapshot per site and day, and reports
/// what changed since the previous snapshot.
#[derive(Parser, Debug)]
#[command(name = "shelfwatch")]
#[command(version)]
#[command(about = "A polite product change tracker", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Only run the named site
    #[arg(long, value_name = "NAME")]
    site: Option<String>,

    /// Snapshot date (YYYY-MM-DD); defaults to today in UTC
    #[arg(long, value_name = "YYYY-MM-DD")]
    date: Option<NaiveDate>,

    /// Validate config and show what would be crawled without crawling
    #[arg(long)]
    dry_run: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if let Some(name) = cli.site.as_deref() {
        if !config.sites.iter().any(|s| s.name == name) {
            bail!("no site named {:?} in {}", name, cli.config.display());
        }
    }

    if cli.dry_run {
        handle_dry_run(&config, cli.site.as_deref());
        return Ok(());
    }

    let mut runner = Runner::from_config(Arc::new(config));
    if let Some(date) = cli.date {
        runner = runner.with_date(date);
    }

    let outcomes = runner.run_all(cli.site.as_deref()).await;
    if !cli.quiet {
        print_run_summary(runner.date(), &outcomes);
    }

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    if failed > 0 && failed == outcomes.len() {
        bail!("all {} site run(s) failed", failed);
    }
    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("shelfwatch=info,warn"),
            1 => EnvFilter::new("shelfwatch=debug,info"),
            2 => EnvFilter::new("shelfwatch=trace,debug"),
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

/// Handles the --dry-run mode: prints the validated plan
fn handle_dry_run(config: &Config, only: Option<&str>) {
    println!("=== Shelfwatch Dry Run ===\n");

    let crawler = &config.crawler;
    println!("Crawler Configuration:");
    println!("  Concurrency per site: {}", crawler.concurrency);
    println!(
        "  Request timeout: {}s, {} attempt(s), {}ms backoff",
        crawler.request_timeout_secs, crawler.retry_attempts, crawler.retry_backoff_ms
    );
    println!(
        "  Rate limit per host: burst {}, {} token(s) every {}s",
        crawler.rate_capacity, crawler.rate_tokens, crawler.rate_per_secs
    );
    println!(
        "  Robots.txt: cached {}h, strict: {}",
        crawler.robots_ttl_hours, crawler.strict_robots
    );

    println!("\nOutput:");
    println!("  Data directory: {}", config.output.data_dir);
    match &config.catalog_csv {
        Some(path) => println!("  Catalog: {}", path),
        None => println!("  Catalog: none"),
    }

    let sites: Vec<_> = config
        .sites
        .iter()
        .filter(|s| only.map_or(true, |name| s.name == name))
        .collect();
    println!("\nSites ({}):", sites.len());
    for site in &sites {
        println!(
            "  - {} (adapter: {}{})",
            site.name,
            site.adapter_key(),
            if site.use_headless { ", headless" } else { "" }
        );
        for url in &site.start_urls {
            println!("    * {}", url);
        }
        if let Some(max) = site.max_pages {
            println!("    max pages: {}", max);
        }
        if let Some(max) = site.max_urls {
            println!("    max urls: {}", max);
        }
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would start from {} listing URL(s)",
        sites.iter().map(|s| s.start_urls.len()).sum::<usize>()
    );
}
