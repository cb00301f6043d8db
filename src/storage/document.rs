//! Document-store storage implementation
//!
//! JSON documents in an embedded `sled` database, one tree per collection.
//! With transactions enabled, writes are staged per scope and applied in one
//! multi-tree transaction on commit. Without transactions every write is
//! applied and flushed as it is issued.
//!
//! Keys:
//! - `players`: `queue_type \0 player_id`
//! - `queues`: `queue_type` (every queue that has at least one player)
//! - `matches`: `match_id`
//! - `participants`: `match_id \0 index`

use crate::api::{Document, RankEntry};
use crate::storage::traits::{Storage, StorageError, StorageResult, Transaction};
use crate::storage::{frontier_order, never_scanned, PlayerRecord};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionalTree,
};
use sled::{Db, Transactional, Tree};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;

const KEY_SEPARATOR: u8 = 0;

type TxResult<T> = ConflictableTransactionResult<T, StorageError>;

/// Transactional views of (players, queues, matches, participants)
type TxTrees = (
    TransactionalTree,
    TransactionalTree,
    TransactionalTree,
    TransactionalTree,
);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredMatch {
    data_version: String,
    inserted_at: DateTime<Utc>,
    fields: Document,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredParticipant {
    match_id: String,
    participant_index: usize,
    fields: Document,
}

/// A write accepted inside an open scope, applied on commit
#[derive(Debug)]
enum StagedWrite {
    UpsertRank {
        entry: RankEntry,
        at: DateTime<Utc>,
    },
    SetScanTime {
        player_id: String,
        at: DateTime<Utc>,
    },
    InsertMatch {
        match_id: String,
        record: StoredMatch,
    },
    InsertParticipants {
        match_id: String,
        documents: Vec<Document>,
    },
}

struct OpenScope {
    id: u64,
    writes: Vec<StagedWrite>,
}

/// Document-store backend
pub struct DocumentStorage {
    db: Db,
    players: Tree,
    queues: Tree,
    matches: Tree,
    participants: Tree,
    transactions: bool,
    active: Option<OpenScope>,
    next_txn: u64,
}

fn player_key(queue_type: &str, player_id: &str) -> Vec<u8> {
    let mut key = queue_prefix(queue_type);
    key.extend_from_slice(player_id.as_bytes());
    key
}

fn queue_prefix(queue_type: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(queue_type.len() + 1);
    prefix.extend_from_slice(queue_type.as_bytes());
    prefix.push(KEY_SEPARATOR);
    prefix
}

fn participant_key(match_id: &str, index: usize) -> Vec<u8> {
    let mut key = Vec::with_capacity(match_id.len() + 7);
    key.extend_from_slice(match_id.as_bytes());
    key.push(KEY_SEPARATOR);
    key.extend_from_slice(format!("{:05}", index).as_bytes());
    key
}

impl DocumentStorage {
    /// Opens (or creates) the store in the directory at `path`
    ///
    /// Anything other than a directory at `path`, including an empty file,
    /// is rejected.
    pub fn open(path: &Path, transactions: bool) -> StorageResult<Self> {
        if path.exists() && !path.is_dir() {
            return Err(StorageError::Database(format!(
                "{} is not a document store directory",
                path.display()
            )));
        }

        let storage = Self::from_db(sled::open(path)?, transactions)?;

        tracing::debug!(
            "Opened document store {}: {} players, {} matches",
            path.display(),
            storage.players.len(),
            storage.matches.len()
        );

        Ok(storage)
    }

    /// Creates a temporary store that is removed when dropped
    pub fn in_memory(transactions: bool) -> StorageResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db, transactions)
    }

    fn from_db(db: Db, transactions: bool) -> StorageResult<Self> {
        Ok(Self {
            players: db.open_tree("players")?,
            queues: db.open_tree("queues")?,
            matches: db.open_tree("matches")?,
            participants: db.open_tree("participants")?,
            db,
            transactions,
            active: None,
            next_txn: 0,
        })
    }

    fn check_scope(&self, txn: &Transaction) -> StorageResult<()> {
        match (txn.id(), self.active.as_ref()) {
            (None, None) => Ok(()),
            (Some(id), Some(scope)) if id == scope.id => Ok(()),
            (None, Some(scope)) => Err(StorageError::Transaction(format!(
                "write without a handle while transaction {} is open",
                scope.id
            ))),
            (Some(id), _) => Err(StorageError::Transaction(format!(
                "transaction {} is not open",
                id
            ))),
        }
    }

    /// Validates a write against committed and staged state, then stages or applies it
    fn submit(&mut self, txn: &Transaction, write: StagedWrite) -> StorageResult<()> {
        self.check_scope(txn)?;

        match self.active.as_mut() {
            Some(scope) => {
                validate(&self.matches, &scope.writes, &write)?;
                scope.writes.push(write);
                Ok(())
            }
            None => self.apply(std::slice::from_ref(&write)),
        }
    }

    /// Applies `writes` in one sled transaction and flushes it to disk
    fn apply(&self, writes: &[StagedWrite]) -> StorageResult<()> {
        let queues = self.known_queues(writes)?;

        (&self.players, &self.queues, &self.matches, &self.participants)
            .transaction(|trees| -> TxResult<()> {
                for write in writes {
                    apply_write(trees, &queues, write)?;
                }
                Ok(())
            })
            .map_err(|e| match e {
                TransactionError::Abort(e) => e,
                TransactionError::Storage(e) => StorageError::from(e),
            })?;

        self.db.flush()?;
        Ok(())
    }

    /// Queue types a scan-time write may touch: committed plus staged
    fn known_queues(&self, writes: &[StagedWrite]) -> StorageResult<BTreeSet<String>> {
        let mut queues = BTreeSet::new();
        for key in self.queues.iter().keys() {
            queues.insert(String::from_utf8_lossy(&key?).into_owned());
        }
        for write in writes {
            if let StagedWrite::UpsertRank { entry, .. } = write {
                queues.insert(entry.queue_type.clone());
            }
        }
        Ok(queues)
    }

    fn take_scope(&mut self, id: u64) -> StorageResult<OpenScope> {
        match self.active.take() {
            Some(scope) if scope.id == id => Ok(scope),
            other => {
                self.active = other;
                Err(StorageError::Transaction(format!(
                    "transaction {} is not open",
                    id
                )))
            }
        }
    }
}

/// Rejects writes that would fail when applied on commit
fn validate(matches: &Tree, staged: &[StagedWrite], write: &StagedWrite) -> StorageResult<()> {
    let staged_match = |id: &str| {
        staged
            .iter()
            .any(|w| matches!(w, StagedWrite::InsertMatch { match_id, .. } if match_id == id))
    };

    match write {
        StagedWrite::InsertMatch { match_id, .. } => {
            if matches.contains_key(match_id.as_bytes())? || staged_match(match_id) {
                return Err(StorageError::DuplicateMatch(match_id.clone()));
            }
        }
        StagedWrite::InsertParticipants { match_id, .. } => {
            if !matches.contains_key(match_id.as_bytes())? && !staged_match(match_id) {
                return Err(unknown_match(match_id));
            }
        }
        StagedWrite::UpsertRank { .. } | StagedWrite::SetScanTime { .. } => {}
    }
    Ok(())
}

fn apply_write(trees: &TxTrees, queues: &BTreeSet<String>, write: &StagedWrite) -> TxResult<()> {
    let (players, queue_index, matches, participants) = trees;

    match write {
        StagedWrite::UpsertRank { entry, at } => {
            let key = player_key(&entry.queue_type, &entry.puuid);
            let record = match players.get(&key)? {
                Some(raw) => {
                    let mut existing: PlayerRecord = decode(&raw)?;
                    existing.refresh_rank(entry, *at);
                    existing
                }
                None => PlayerRecord::from_entry(entry, *at),
            };
            players.insert(key, encode(&record)?)?;
            queue_index.insert(entry.queue_type.as_bytes(), &b""[..])?;
        }
        StagedWrite::SetScanTime { player_id, at } => {
            for queue_type in queues {
                let key = player_key(queue_type, player_id);
                if let Some(raw) = players.get(&key)? {
                    let mut record: PlayerRecord = decode(&raw)?;
                    record.matches_updated_at = *at;
                    players.insert(key, encode(&record)?)?;
                }
            }
        }
        StagedWrite::InsertMatch { match_id, record } => {
            if matches.get(match_id.as_bytes())?.is_some() {
                return sled::transaction::abort(StorageError::DuplicateMatch(match_id.clone()));
            }
            matches.insert(match_id.as_bytes(), encode(record)?)?;
        }
        StagedWrite::InsertParticipants {
            match_id,
            documents,
        } => {
            if matches.get(match_id.as_bytes())?.is_none() {
                return sled::transaction::abort(unknown_match(match_id));
            }
            let mut index = 0;
            while participants.get(participant_key(match_id, index))?.is_some() {
                index += 1;
            }
            for fields in documents {
                let stored = StoredParticipant {
                    match_id: match_id.clone(),
                    participant_index: index,
                    fields: fields.clone(),
                };
                participants.insert(participant_key(match_id, index), encode(&stored)?)?;
                index += 1;
            }
        }
    }
    Ok(())
}

fn encode<T: Serialize>(value: &T) -> TxResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| ConflictableTransactionError::Abort(e.into()))
}

fn decode<T: DeserializeOwned>(raw: &[u8]) -> TxResult<T> {
    serde_json::from_slice(raw).map_err(|e| ConflictableTransactionError::Abort(e.into()))
}

fn unknown_match(match_id: &str) -> StorageError {
    StorageError::ConstraintViolation(format!(
        "participants reference unknown match {}",
        match_id
    ))
}

fn count_entries(entries: sled::Iter) -> StorageResult<u64> {
    let mut count = 0;
    for entry in entries {
        entry?;
        count += 1;
    }
    Ok(count)
}

impl Storage for DocumentStorage {
    fn backend_name(&self) -> &'static str {
        "document"
    }

    fn supports_transactions(&self) -> bool {
        self.transactions
    }

    fn select_crawl_frontier(&self, queue_type: &str) -> StorageResult<Vec<String>> {
        let mut players = Vec::new();
        for entry in self.players.scan_prefix(queue_prefix(queue_type)) {
            let (_, raw) = entry?;
            players.push(serde_json::from_slice::<PlayerRecord>(&raw)?);
        }
        players.sort_by(frontier_order);

        Ok(players.into_iter().map(|p| p.player_id).collect())
    }

    fn filter_unknown_matches(&self, candidate_ids: &[String]) -> StorageResult<Vec<String>> {
        let mut seen = HashSet::new();
        let mut unknown = Vec::new();
        for id in candidate_ids {
            if !self.matches.contains_key(id.as_bytes())? && seen.insert(id.as_str()) {
                unknown.push(id.clone());
            }
        }
        Ok(unknown)
    }

    fn begin_transaction(&mut self) -> StorageResult<Transaction> {
        if !self.transactions {
            return Ok(Transaction::none());
        }
        if let Some(scope) = &self.active {
            return Err(StorageError::Transaction(format!(
                "transaction {} is still open",
                scope.id
            )));
        }

        self.next_txn += 1;
        self.active = Some(OpenScope {
            id: self.next_txn,
            writes: Vec::new(),
        });
        Ok(Transaction::scoped(self.next_txn))
    }

    fn commit_transaction(&mut self, txn: Transaction) -> StorageResult<()> {
        let Some(id) = txn.id() else {
            return Ok(());
        };
        let scope = self.take_scope(id)?;
        self.apply(&scope.writes)
    }

    fn abort_transaction(&mut self, txn: Transaction) -> StorageResult<()> {
        let Some(id) = txn.id() else {
            return Ok(());
        };
        let scope = self.take_scope(id)?;
        tracing::debug!("Discarded {} staged writes", scope.writes.len());
        Ok(())
    }

    fn upsert_rank_record(&mut self, entry: &RankEntry, txn: &Transaction) -> StorageResult<()> {
        self.submit(
            txn,
            StagedWrite::UpsertRank {
                entry: entry.clone(),
                at: Utc::now(),
            },
        )
    }

    fn touch_matches_scanned(&mut self, player_id: &str, txn: &Transaction) -> StorageResult<()> {
        self.submit(
            txn,
            StagedWrite::SetScanTime {
                player_id: player_id.to_string(),
                at: Utc::now(),
            },
        )
    }

    fn reset_matches_scanned(&mut self, player_id: &str, txn: &Transaction) -> StorageResult<()> {
        self.submit(
            txn,
            StagedWrite::SetScanTime {
                player_id: player_id.to_string(),
                at: never_scanned(),
            },
        )
    }

    fn insert_match(
        &mut self,
        match_id: &str,
        data_version: &str,
        fields: &Document,
        txn: &Transaction,
    ) -> StorageResult<()> {
        self.submit(
            txn,
            StagedWrite::InsertMatch {
                match_id: match_id.to_string(),
                record: StoredMatch {
                    data_version: data_version.to_string(),
                    inserted_at: Utc::now(),
                    fields: fields.clone(),
                },
            },
        )
    }

    fn insert_participants(
        &mut self,
        match_id: &str,
        participants: &[Document],
        txn: &Transaction,
    ) -> StorageResult<()> {
        if participants.is_empty() {
            return Ok(());
        }
        self.submit(
            txn,
            StagedWrite::InsertParticipants {
                match_id: match_id.to_string(),
                documents: participants.to_vec(),
            },
        )
    }

    fn get_player(&self, queue_type: &str, player_id: &str) -> StorageResult<Option<PlayerRecord>> {
        let record = self
            .players
            .get(player_key(queue_type, player_id))?
            .map(|raw| serde_json::from_slice::<PlayerRecord>(&raw))
            .transpose()?;
        Ok(record)
    }

    fn count_players(&self, queue_type: Option<&str>) -> StorageResult<u64> {
        match queue_type {
            Some(queue) => count_entries(self.players.scan_prefix(queue_prefix(queue))),
            None => count_entries(self.players.iter()),
        }
    }

    fn count_matches(&self) -> StorageResult<u64> {
        count_entries(self.matches.iter())
    }

    fn count_participants(&self) -> StorageResult<u64> {
        count_entries(self.participants.iter())
    }
}
