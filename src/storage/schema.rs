//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the relational backend.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per (queue, player) rank standing; drives the crawl frontier
CREATE TABLE IF NOT EXISTS players (
    queue_type TEXT NOT NULL,
    player_id TEXT NOT NULL,
    league_id TEXT,
    tier TEXT,
    division TEXT,
    league_points INTEGER NOT NULL DEFAULT 0,
    wins INTEGER NOT NULL DEFAULT 0,
    losses INTEGER NOT NULL DEFAULT 0,
    veteran INTEGER NOT NULL DEFAULT 0,
    inactive INTEGER NOT NULL DEFAULT 0,
    fresh_blood INTEGER NOT NULL DEFAULT 0,
    hot_streak INTEGER NOT NULL DEFAULT 0,
    total_games INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    rank_updated_at TEXT NOT NULL,
    matches_updated_at TEXT NOT NULL,
    PRIMARY KEY (queue_type, player_id)
);

CREATE INDEX IF NOT EXISTS idx_players_frontier
    ON players(queue_type, matches_updated_at, total_games DESC);
CREATE INDEX IF NOT EXISTS idx_players_player ON players(player_id);

-- Ingested matches; nested participant/team data is normalized out
CREATE TABLE IF NOT EXISTS matches (
    match_id TEXT PRIMARY KEY,
    data_version TEXT NOT NULL,
    queue_id INTEGER,
    game_creation INTEGER,
    game_duration INTEGER,
    game_version TEXT,
    platform_id TEXT,
    end_of_game_result TEXT,
    fields TEXT NOT NULL,
    inserted_at TEXT NOT NULL
);

-- Per-player statistics of an ingested match
CREATE TABLE IF NOT EXISTS match_participants (
    match_id TEXT NOT NULL REFERENCES matches(match_id),
    participant_index INTEGER NOT NULL,
    player_id TEXT,
    champion_name TEXT,
    team_id INTEGER,
    win INTEGER,
    fields TEXT NOT NULL,
    PRIMARY KEY (match_id, participant_index)
);

CREATE INDEX IF NOT EXISTS idx_participants_player ON match_participants(player_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
