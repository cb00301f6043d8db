//! Storage traits and error types
//!
//! This module defines the persistence port every backend implements, the
//! transaction handle, and the associated error types.

use crate::api::{Document, RankEntry};
use crate::storage::PlayerRecord;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Match already stored: {0}")]
    DuplicateMatch(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Document store error: {0}")]
    Sled(#[from] sled::Error),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Handle for a write scope opened by [`Storage::begin_transaction`]
///
/// The empty handle (`Transaction::none()`) means writes are applied as they
/// are issued; committing or aborting it does nothing.
#[derive(Debug, PartialEq, Eq)]
pub struct Transaction {
    id: Option<u64>,
}

impl Transaction {
    /// The empty handle
    pub fn none() -> Self {
        Self { id: None }
    }

    pub(crate) fn scoped(id: u64) -> Self {
        Self { id: Some(id) }
    }

    /// True when this handle refers to an open atomic scope
    pub fn is_active(&self) -> bool {
        self.id.is_some()
    }

    pub(crate) fn id(&self) -> Option<u64> {
        self.id
    }
}

/// Trait for storage backend implementations
///
/// This trait defines every persistence operation needed by the crawler.
/// Backends are selected once at startup; callers only see this interface.
pub trait Storage: Send {
    // ===== Capabilities =====

    /// Short backend name for logs
    fn backend_name(&self) -> &'static str;

    /// Whether `begin_transaction` provides multi-record atomicity
    ///
    /// When false, writes issued under a transaction are applied in order
    /// as they are issued and an abort cannot undo them.
    fn supports_transactions(&self) -> bool;

    // ===== Crawl Frontier =====

    /// Returns the player IDs ranked in `queue_type`, least recently scanned first
    ///
    /// Ordered by `matches_updated_at` ascending, then total games descending.
    /// Reflects every committed write.
    fn select_crawl_frontier(&self, queue_type: &str) -> StorageResult<Vec<String>>;

    /// Returns the candidate match IDs not yet stored, preserving input order
    fn filter_unknown_matches(&self, candidate_ids: &[String]) -> StorageResult<Vec<String>>;

    // ===== Transactions =====

    /// Opens a write scope
    ///
    /// Returns the empty handle when the backend cannot provide atomicity.
    fn begin_transaction(&mut self) -> StorageResult<Transaction>;

    /// Makes all writes issued under `txn` durable
    ///
    /// If the commit itself fails the scope is rolled back before returning.
    fn commit_transaction(&mut self, txn: Transaction) -> StorageResult<()>;

    /// Discards all writes issued under `txn`
    ///
    /// The scope is released even when the rollback reports an error.
    fn abort_transaction(&mut self, txn: Transaction) -> StorageResult<()>;

    // ===== Writes =====

    /// Inserts or refreshes the rank record keyed by (queue type, player)
    ///
    /// A new record gets `created_at`, `rank_updated_at` and
    /// `matches_updated_at` set to now. An existing record has its rank
    /// fields and `rank_updated_at` refreshed; `matches_updated_at` is kept.
    fn upsert_rank_record(&mut self, entry: &RankEntry, txn: &Transaction) -> StorageResult<()>;

    /// Marks the player's match list as fully scanned as of now
    fn touch_matches_scanned(&mut self, player_id: &str, txn: &Transaction) -> StorageResult<()>;

    /// Moves the player to the head of the frontier (scan time set to the epoch)
    fn reset_matches_scanned(&mut self, player_id: &str, txn: &Transaction) -> StorageResult<()>;

    /// Inserts a match record
    ///
    /// Fails with [`StorageError::DuplicateMatch`] if the match is already stored.
    fn insert_match(
        &mut self,
        match_id: &str,
        data_version: &str,
        fields: &Document,
        txn: &Transaction,
    ) -> StorageResult<()>;

    /// Inserts the participant records of a match; no-op for an empty slice
    fn insert_participants(
        &mut self,
        match_id: &str,
        participants: &[Document],
        txn: &Transaction,
    ) -> StorageResult<()>;

    // ===== Reads =====

    /// Gets the rank record for (queue type, player)
    fn get_player(&self, queue_type: &str, player_id: &str) -> StorageResult<Option<PlayerRecord>>;

    /// Counts rank records, optionally restricted to one queue
    fn count_players(&self, queue_type: Option<&str>) -> StorageResult<u64>;

    /// Counts stored matches
    fn count_matches(&self) -> StorageResult<u64>;

    /// Counts stored participant records
    fn count_participants(&self) -> StorageResult<u64>;
}
