//! Storage module for persisting crawl data
//!
//! This module handles all persistence for the crawler, including:
//! - The backend-agnostic [`Storage`] port and its transaction handle
//! - A relational backend (SQLite)
//! - A document-store backend (JSON documents in sled trees)
//! - Rank records that drive the crawl frontier

mod document;
mod schema;
mod sqlite;
mod traits;

pub use document::DocumentStorage;
pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult, Transaction};

use crate::api::RankEntry;
use crate::config::{StorageBackend, StorageConfig};
use crate::CrawlError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::Path;

/// Opens the backend selected in configuration
///
/// Called once at startup; the returned port is used for the whole run.
pub fn open_storage(config: &StorageConfig) -> Result<Box<dyn Storage>, CrawlError> {
    let path = Path::new(&config.path);
    let storage: Box<dyn Storage> = match config.backend {
        StorageBackend::Sqlite => Box::new(SqliteStorage::new(path)?),
        StorageBackend::Document => Box::new(DocumentStorage::open(path, config.transactions)?),
    };

    if storage.supports_transactions() {
        tracing::info!("Opened {} storage at {}", storage.backend_name(), config.path);
    } else {
        tracing::warn!(
            "Opened {} storage at {} without transactions: match writes are ordered but cannot be rolled back",
            storage.backend_name(),
            config.path
        );
    }

    Ok(storage)
}

/// Runs `writes` inside one transaction
///
/// Commits when `writes` succeeds. On failure the transaction is aborted
/// before the original error is returned; an abort failure is only logged.
pub fn with_transaction<F>(storage: &mut dyn Storage, writes: F) -> StorageResult<()>
where
    F: FnOnce(&mut dyn Storage, &Transaction) -> StorageResult<()>,
{
    let txn = storage.begin_transaction()?;
    match writes(&mut *storage, &txn) {
        Ok(()) => storage.commit_transaction(txn),
        Err(e) => {
            if let Err(abort_err) = storage.abort_transaction(txn) {
                tracing::warn!("Abort after failed write also failed: {}", abort_err);
            }
            Err(e)
        }
    }
}

/// A player's persisted standing in one queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub player_id: String,
    pub queue_type: String,
    pub league_id: Option<String>,
    pub tier: Option<String>,
    pub division: Option<String>,
    pub league_points: i64,
    pub wins: i64,
    pub losses: i64,
    pub veteran: bool,
    pub inactive: bool,
    pub fresh_blood: bool,
    pub hot_streak: bool,
    pub total_games: i64,
    pub created_at: DateTime<Utc>,
    /// Last time the rank fields were refreshed
    pub rank_updated_at: DateTime<Utc>,
    /// Last time this player's match list was fully scanned
    pub matches_updated_at: DateTime<Utc>,
}

impl PlayerRecord {
    /// Builds the record for a first sighting at `now`
    pub fn from_entry(entry: &RankEntry, now: DateTime<Utc>) -> Self {
        Self {
            player_id: entry.puuid.clone(),
            queue_type: entry.queue_type.clone(),
            league_id: entry.league_id.clone(),
            tier: entry.tier.clone(),
            division: entry.rank.clone(),
            league_points: entry.league_points,
            wins: entry.wins,
            losses: entry.losses,
            veteran: entry.veteran,
            inactive: entry.inactive,
            fresh_blood: entry.fresh_blood,
            hot_streak: entry.hot_streak,
            total_games: entry.total_games(),
            created_at: now,
            rank_updated_at: now,
            matches_updated_at: now,
        }
    }

    /// Refreshes the rank fields from a later sighting
    ///
    /// Leaves `created_at` and `matches_updated_at` untouched.
    pub fn refresh_rank(&mut self, entry: &RankEntry, now: DateTime<Utc>) {
        self.league_id = entry.league_id.clone();
        self.tier = entry.tier.clone();
        self.division = entry.rank.clone();
        self.league_points = entry.league_points;
        self.wins = entry.wins;
        self.losses = entry.losses;
        self.veteran = entry.veteran;
        self.inactive = entry.inactive;
        self.fresh_blood = entry.fresh_blood;
        self.hot_streak = entry.hot_streak;
        self.total_games = entry.total_games();
        self.rank_updated_at = now;
    }
}

/// Frontier ordering: oldest scan first, then most games, then player ID
pub fn frontier_order(a: &PlayerRecord, b: &PlayerRecord) -> Ordering {
    a.matches_updated_at
        .cmp(&b.matches_updated_at)
        .then_with(|| b.total_games.cmp(&a.total_games))
        .then_with(|| a.player_id.cmp(&b.player_id))
}

/// Scan time given to players that should be crawled before anyone else
pub fn never_scanned() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

/// Fixed-width RFC 3339 so stored timestamps sort lexicographically
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}
