//! Upstream payload types
//!
//! Only the fields the crawler reasons about are typed; everything else in a
//! match payload is carried through as JSON and persisted as-is.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A JSON object as stored by the persistence layer
pub type Document = Map<String, Value>;

/// Nested match fields that are normalized out of the match record
pub const MATCH_EXCLUDED_FIELDS: &[&str] = &["participants", "teams", "gameModeMutators"];

/// Large or inconsistent participant sub-objects that are dropped
pub const PARTICIPANT_EXCLUDED_FIELDS: &[&str] = &["perks", "challenges", "missions", "bountyLevel"];

/// Value of `endOfGameResult` for a normally finished game
pub const GAME_COMPLETE: &str = "GameComplete";

/// A player's standing within one competitive queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankEntry {
    #[serde(default)]
    pub league_id: Option<String>,
    pub queue_type: String,
    #[serde(default)]
    pub tier: Option<String>,
    /// Division within the tier (I-IV)
    #[serde(default)]
    pub rank: Option<String>,
    pub puuid: String,
    #[serde(default)]
    pub league_points: i64,
    #[serde(default)]
    pub wins: i64,
    #[serde(default)]
    pub losses: i64,
    #[serde(default)]
    pub veteran: bool,
    #[serde(default)]
    pub inactive: bool,
    #[serde(default)]
    pub fresh_blood: bool,
    #[serde(default)]
    pub hot_streak: bool,
}

impl RankEntry {
    /// Games played in this queue, used to order the frontier
    pub fn total_games(&self) -> i64 {
        self.wins + self.losses
    }
}

/// Identity part of a match payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchMetadata {
    pub match_id: String,
    pub data_version: String,
    #[serde(default)]
    pub participants: Vec<String>,
}

/// A full match payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchPayload {
    pub metadata: MatchMetadata,
    pub info: Document,
}

impl MatchPayload {
    /// `info.endOfGameResult`, if present
    pub fn end_of_game_result(&self) -> Option<&str> {
        self.info.get("endOfGameResult").and_then(Value::as_str)
    }

    /// `info.queueId`, if present
    pub fn queue_id(&self) -> Option<i64> {
        self.info.get("queueId").and_then(Value::as_i64)
    }

    /// `info.gameDuration` in seconds, zero when absent
    pub fn game_duration(&self) -> i64 {
        self.info
            .get("gameDuration")
            .and_then(Value::as_i64)
            .unwrap_or(0)
    }

    /// The participant objects of `info.participants`
    pub fn participants(&self) -> impl Iterator<Item = &Document> {
        self.info
            .get("participants")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_object)
    }

    /// Player identifiers of all participants, in payload order
    pub fn participant_ids(&self) -> Vec<&str> {
        self.participants()
            .filter_map(|p| p.get("puuid").and_then(Value::as_str))
            .collect()
    }

    /// Match metadata fields to persist, without nested substructures
    pub fn match_fields(&self) -> Document {
        strip_fields(&self.info, MATCH_EXCLUDED_FIELDS)
    }

    /// Participant records to persist, without oversized sub-objects
    pub fn participant_records(&self) -> Vec<Document> {
        self.participants()
            .map(|p| strip_fields(p, PARTICIPANT_EXCLUDED_FIELDS))
            .collect()
    }
}

/// Copies `source` without the keys listed in `excluded`
fn strip_fields(source: &Document, excluded: &[&str]) -> Document {
    source
        .iter()
        .filter(|(key, _)| !excluded.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
