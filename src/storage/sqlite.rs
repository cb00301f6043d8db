//! SQLite storage implementation
//!
//! This module provides the relational implementation of the Storage trait.
//! Transactions map onto `BEGIN IMMEDIATE` / `COMMIT` / `ROLLBACK` on the
//! single connection owned by the backend.

use crate::api::{Document, RankEntry};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult, Transaction};
use crate::storage::{format_timestamp, never_scanned, PlayerRecord};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// How long a write waits for another connection's lock before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on bound parameters per `IN (...)` query
const MAX_IN_PARAMS: usize = 500;

const PLAYER_COLUMNS: &str = "player_id, queue_type, league_id, tier, division, league_points,
     wins, losses, veteran, inactive, fresh_blood, hot_streak, total_games,
     created_at, rank_updated_at, matches_updated_at";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
    active: Option<u64>,
    next_txn: u64,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        Self::from_connection(conn)
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        initialize_schema(&conn)?;
        Ok(Self {
            conn,
            active: None,
            next_txn: 0,
        })
    }

    /// Checks that a write under `txn` targets the scope currently open
    fn check_scope(&self, txn: &Transaction) -> StorageResult<()> {
        match (txn.id(), self.active) {
            (None, None) => Ok(()),
            (Some(id), Some(active)) if id == active => Ok(()),
            (None, Some(active)) => Err(StorageError::Transaction(format!(
                "write without a handle while transaction {} is open",
                active
            ))),
            (Some(id), _) => Err(StorageError::Transaction(format!(
                "transaction {} is not open",
                id
            ))),
        }
    }

    /// Releases the open scope, rolling back if SQLite still holds it
    fn rollback(&mut self) -> StorageResult<()> {
        self.active = None;
        if self.conn.is_autocommit() {
            return Ok(());
        }
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn set_scan_time(
        &mut self,
        player_id: &str,
        at: DateTime<Utc>,
        txn: &Transaction,
    ) -> StorageResult<()> {
        self.check_scope(txn)?;
        self.conn.execute(
            "UPDATE players SET matches_updated_at = ?1 WHERE player_id = ?2",
            params![format_timestamp(at), player_id],
        )?;
        Ok(())
    }
}

impl Storage for SqliteStorage {
    // ===== Capabilities =====

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    fn supports_transactions(&self) -> bool {
        true
    }

    // ===== Crawl Frontier =====

    fn select_crawl_frontier(&self, queue_type: &str) -> StorageResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT player_id FROM players WHERE queue_type = ?1
             ORDER BY matches_updated_at ASC, total_games DESC, player_id ASC",
        )?;

        let players = stmt
            .query_map(params![queue_type], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(players)
    }

    fn filter_unknown_matches(&self, candidate_ids: &[String]) -> StorageResult<Vec<String>> {
        if candidate_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut existing = HashSet::new();
        for chunk in candidate_ids.chunks(MAX_IN_PARAMS) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let mut stmt = self.conn.prepare(&format!(
                "SELECT match_id FROM matches WHERE match_id IN ({})",
                placeholders
            ))?;
            let found = stmt
                .query_map(params_from_iter(chunk.iter()), |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            existing.extend(found);
        }

        let mut seen = HashSet::new();
        Ok(candidate_ids
            .iter()
            .filter(|id| !existing.contains(*id) && seen.insert(id.as_str()))
            .cloned()
            .collect())
    }

    // ===== Transactions =====

    fn begin_transaction(&mut self) -> StorageResult<Transaction> {
        if let Some(active) = self.active {
            return Err(StorageError::Transaction(format!(
                "transaction {} is still open",
                active
            )));
        }

        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        self.next_txn += 1;
        self.active = Some(self.next_txn);
        Ok(Transaction::scoped(self.next_txn))
    }

    fn commit_transaction(&mut self, txn: Transaction) -> StorageResult<()> {
        let Some(id) = txn.id() else {
            return Ok(());
        };
        if self.active != Some(id) {
            return Err(StorageError::Transaction(format!(
                "transaction {} is not open",
                id
            )));
        }

        match self.conn.execute_batch("COMMIT") {
            Ok(()) => {
                self.active = None;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = self.rollback() {
                    tracing::warn!("Rollback after failed commit also failed: {}", rollback);
                }
                Err(e.into())
            }
        }
    }

    fn abort_transaction(&mut self, txn: Transaction) -> StorageResult<()> {
        let Some(id) = txn.id() else {
            return Ok(());
        };
        if self.active != Some(id) {
            return Err(StorageError::Transaction(format!(
                "transaction {} is not open",
                id
            )));
        }
        self.rollback()
    }

    // ===== Writes =====

    fn upsert_rank_record(&mut self, entry: &RankEntry, txn: &Transaction) -> StorageResult<()> {
        self.check_scope(txn)?;
        let now = format_timestamp(Utc::now());

        self.conn.execute(
            "INSERT INTO players (queue_type, player_id, league_id, tier, division, league_points,
                 wins, losses, veteran, inactive, fresh_blood, hot_streak, total_games,
                 created_at, rank_updated_at, matches_updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14, ?14)
             ON CONFLICT(queue_type, player_id) DO UPDATE SET
                 league_id = excluded.league_id,
                 tier = excluded.tier,
                 division = excluded.division,
                 league_points = excluded.league_points,
                 wins = excluded.wins,
                 losses = excluded.losses,
                 veteran = excluded.veteran,
                 inactive = excluded.inactive,
                 fresh_blood = excluded.fresh_blood,
                 hot_streak = excluded.hot_streak,
                 total_games = excluded.total_games,
                 rank_updated_at = excluded.rank_updated_at",
            params![
                entry.queue_type,
                entry.puuid,
                entry.league_id,
                entry.tier,
                entry.rank,
                entry.league_points,
                entry.wins,
                entry.losses,
                entry.veteran,
                entry.inactive,
                entry.fresh_blood,
                entry.hot_streak,
                entry.total_games(),
                now
            ],
        )?;
        Ok(())
    }

    fn touch_matches_scanned(&mut self, player_id: &str, txn: &Transaction) -> StorageResult<()> {
        self.set_scan_time(player_id, Utc::now(), txn)
    }

    fn reset_matches_scanned(&mut self, player_id: &str, txn: &Transaction) -> StorageResult<()> {
        self.set_scan_time(player_id, never_scanned(), txn)
    }

    fn insert_match(
        &mut self,
        match_id: &str,
        data_version: &str,
        fields: &Document,
        txn: &Transaction,
    ) -> StorageResult<()> {
        self.check_scope(txn)?;
        let fields_json = serde_json::to_string(fields)?;

        let result = self.conn.execute(
            "INSERT INTO matches (match_id, data_version, queue_id, game_creation, game_duration,
                 game_version, platform_id, end_of_game_result, fields, inserted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                match_id,
                data_version,
                fields.get("queueId").and_then(Value::as_i64),
                fields.get("gameCreation").and_then(Value::as_i64),
                fields.get("gameDuration").and_then(Value::as_i64),
                fields.get("gameVersion").and_then(Value::as_str),
                fields.get("platformId").and_then(Value::as_str),
                fields.get("endOfGameResult").and_then(Value::as_str),
                fields_json,
                format_timestamp(Utc::now())
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => {
                Err(StorageError::DuplicateMatch(match_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
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
        self.check_scope(txn)?;

        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO match_participants (match_id, participant_index, player_id,
                 champion_name, team_id, win, fields)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;

        for (index, participant) in participants.iter().enumerate() {
            let fields_json = serde_json::to_string(participant)?;
            stmt.execute(params![
                match_id,
                index as i64,
                participant.get("puuid").and_then(Value::as_str),
                participant.get("championName").and_then(Value::as_str),
                participant.get("teamId").and_then(Value::as_i64),
                participant.get("win").and_then(Value::as_bool),
                fields_json
            ])
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    StorageError::ConstraintViolation(format!(
                        "participant {} of match {}: {}",
                        index, match_id, e
                    ))
                } else {
                    e.into()
                }
            })?;
        }

        Ok(())
    }

    // ===== Reads =====

    fn get_player(&self, queue_type: &str, player_id: &str) -> StorageResult<Option<PlayerRecord>> {
        let player = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM players WHERE queue_type = ?1 AND player_id = ?2",
                    PLAYER_COLUMNS
                ),
                params![queue_type, player_id],
                read_player,
            )
            .optional()?;

        Ok(player)
    }

    fn count_players(&self, queue_type: Option<&str>) -> StorageResult<u64> {
        let count: i64 = match queue_type {
            Some(queue) => self.conn.query_row(
                "SELECT COUNT(*) FROM players WHERE queue_type = ?1",
                params![queue],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM players", [], |row| row.get(0))?,
        };
        Ok(count as u64)
    }

    fn count_matches(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM matches", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_participants(&self) -> StorageResult<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM match_participants", [], |row| {
                    row.get(0)
                })?;
        Ok(count as u64)
    }
}

fn is_constraint_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

fn read_player(row: &Row<'_>) -> rusqlite::Result<PlayerRecord> {
    Ok(PlayerRecord {
        player_id: row.get(0)?,
        queue_type: row.get(1)?,
        league_id: row.get(2)?,
        tier: row.get(3)?,
        division: row.get(4)?,
        league_points: row.get(5)?,
        wins: row.get(6)?,
        losses: row.get(7)?,
        veteran: row.get(8)?,
        inactive: row.get(9)?,
        fresh_blood: row.get(10)?,
        hot_streak: row.get(11)?,
        total_games: row.get(12)?,
        created_at: timestamp_column(row, 13)?,
        rank_updated_at: timestamp_column(row, 14)?,
        matches_updated_at: timestamp_column(row, 15)?,
    })
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
