//! Statistics generation from the crawl store
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from the storage layer.

use crate::storage::{never_scanned, PlayerRecord, Storage};
use crate::CrawlError;

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Backend the numbers were read from
    pub backend: &'static str,

    /// Whether the backend provides multi-record atomicity
    pub transactional: bool,

    /// Primary ranked queue
    pub queue_type: String,

    /// Rank records across every queue
    pub total_rank_records: u64,

    /// Players ranked in the primary queue (the frontier population)
    pub frontier_size: u64,

    /// Total number of ingested matches
    pub total_matches: u64,

    /// Total number of participant records
    pub total_participants: u64,

    /// Next player the crawl loop will pick up
    pub next_player: Option<PlayerRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
/// * `queue_type` - The primary ranked queue
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(CrawlError)` - Failed to query statistics
pub fn load_statistics(
    storage: &dyn Storage,
    queue_type: &str,
) -> Result<CrawlStatistics, CrawlError> {
    let frontier = storage.select_crawl_frontier(queue_type)?;
    let next_player = match frontier.first() {
        Some(player_id) => storage.get_player(queue_type, player_id)?,
        None => None,
    };

    Ok(CrawlStatistics {
        backend: storage.backend_name(),
        transactional: storage.supports_transactions(),
        queue_type: queue_type.to_string(),
        total_rank_records: storage.count_players(None)?,
        frontier_size: storage.count_players(Some(queue_type))?,
        total_matches: storage.count_matches()?,
        total_participants: storage.count_participants()?,
        next_player,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Storage:");
    println!("  Backend: {}", stats.backend);
    println!(
        "  Transactions: {}",
        if stats.transactional {
            "enabled"
        } else {
            "disabled (ordered writes, no rollback)"
        }
    );
    println!();

    println!("Players:");
    println!("  Rank records (all queues): {}", stats.total_rank_records);
    println!("  Ranked in {}: {}", stats.queue_type, stats.frontier_size);
    println!();

    println!("Matches:");
    println!("  Ingested: {}", stats.total_matches);
    println!("  Participant records: {}", stats.total_participants);
    let per_match = if stats.total_matches > 0 {
        stats.total_participants as f64 / stats.total_matches as f64
    } else {
        0.0
    };
    println!("  Participants per match: {:.1}", per_match);
    println!();

    match &stats.next_player {
        Some(player) => {
            let scanned = if player.matches_updated_at == never_scanned() {
                "never".to_string()
            } else {
                player.matches_updated_at.to_rfc3339()
            };
            println!(
                "Next up: {} ({} games, last scanned {})",
                player.player_id, player.total_games, scanned
            );
        }
        None => println!("Frontier is empty"),
    }
}
