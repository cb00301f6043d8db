//! Rank-Crawler main entry point
//!
//! This is the command-line interface for the Rank-Crawler match-history harvester.

use anyhow::Context;
use clap::Parser;
use rank_crawler::config::{load_config_with_hash, Config};
use rank_crawler::crawler::{crawl, Crawler};
use rank_crawler::output::{load_statistics, print_statistics};
use rank_crawler::storage::open_storage;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Rank-Crawler: a ranked match-history harvester
///
/// Rank-Crawler walks the player population least-recently-scanned first,
/// ingesting each player's new ranked matches and the rank standings of
/// everyone they played with, while staying inside the API rate limit.
#[derive(Parser, Debug)]
#[command(name = "rank-crawler")]
#[command(version = "1.0.0")]
#[command(about = "A ranked match-history harvester", long_about = None)]
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

    /// Validate config and show the effective settings without crawling
    #[arg(long, conflicts_with_all = ["stats", "seed"])]
    dry_run: bool,

    /// Show statistics from the store and exit
    #[arg(long, conflicts_with_all = ["dry_run", "seed"])]
    stats: bool,

    /// Add players to the head of the frontier and exit
    #[arg(long, value_name = "PUUID", num_args = 1.., conflicts_with_all = ["dry_run", "stats"])]
    seed: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e).context("invalid configuration");
        }
    };
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else if !cli.seed.is_empty() {
        handle_seed(&config, &cli.seed).await?;
    } else {
        handle_crawl(&config).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("rank_crawler=info,warn"),
            1 => EnvFilter::new("rank_crawler=debug,info"),
            2 => EnvFilter::new("rank_crawler=trace,debug"),
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

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== Rank-Crawler Dry Run ===\n");

    println!("API:");
    println!("  Platform host: {}", config.api.platform_url);
    println!("  Regional host: {}", config.api.regional_url);
    println!("  Match page size: {}", config.api.match_page_size);
    match config.api.resolve_api_key() {
        Ok(_) => println!("  API key: configured"),
        Err(e) => println!("  API key: MISSING ({})", e),
    }

    println!("\nRate Limit:");
    println!(
        "  {} requests per {}s window",
        config.rate_limit.max_requests, config.rate_limit.window_seconds
    );

    println!("\nRetry:");
    println!("  Max attempts: {}", config.retry.max_attempts);
    println!(
        "  Not-found cooldown: {}s",
        config.retry.not_found_cooldown_secs
    );

    println!("\nCrawl:");
    println!(
        "  Queue: {} (queue id {})",
        config.crawl.queue_type, config.crawl.queue_id
    );
    println!("  Minimum duration: {}s", config.crawl.min_duration_secs);
    match config.crawl.min_match_id {
        Some(min) => println!(
            "  Match threshold: {}{} (exclusive)",
            config.crawl.region_prefix, min
        ),
        None => println!("  Match threshold: disabled"),
    }
    println!("  Idle sleep: {}s", config.crawl.idle_secs);

    println!("\nStorage:");
    println!("  Backend: {:?}", config.storage.backend);
    println!("  Path: {}", config.storage.path);
    println!("  Transactions: {}", config.storage.transactions);

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the store
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Store: {}\n", config.storage.path);

    let storage = open_storage(&config.storage).context("failed to open storage")?;
    let stats = load_statistics(storage.as_ref(), &config.crawl.queue_type)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --seed mode: puts players at the head of the frontier
async fn handle_seed(config: &Config, players: &[String]) -> anyhow::Result<()> {
    let mut crawler = Crawler::new(config)?;

    for player_id in players {
        crawler
            .seed_player(player_id)
            .await
            .with_context(|| format!("failed to seed {}", player_id))?;
    }

    println!("✓ Seeded {} players", players.len());
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config) -> anyhow::Result<()> {
    tracing::info!(
        "Crawling {} via {} / {}",
        config.crawl.queue_type,
        config.api.platform_url,
        config.api.regional_url
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for interrupt: {}", e);
            std::future::pending::<()>().await;
        }
    };

    crawl(config, shutdown).await.context("crawl failed")?;
    tracing::info!("Crawl stopped");
    Ok(())
}
