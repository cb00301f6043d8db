//! Match ingestion
//!
//! Drives one candidate match through `Candidate -> Fetched -> Filtered` and
//! then either `Ingested` (all writes committed in one transaction) or
//! `Skipped` (nothing written). Network fetches for a match always happen
//! before its transaction opens.

use crate::api::{MatchPayload, RankEntry, RiotApi, GAME_COMPLETE};
use crate::config::CrawlConfig;
use crate::state::{MatchState, SkipReason};
use crate::storage::{with_transaction, Storage};
use crate::CrawlError;

/// Result of driving one candidate match to a terminal state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Match and participants were committed along with participant ranks
    Ingested {
        participants: usize,
        rank_updates: usize,
    },
    /// Match was irrelevant; nothing was written
    Skipped(SkipReason),
}

/// Tracks one match through the ingestion states
#[derive(Debug)]
pub struct MatchProgress {
    match_id: String,
    state: MatchState,
}

impl MatchProgress {
    pub fn new(match_id: &str) -> Self {
        Self {
            match_id: match_id.to_string(),
            state: MatchState::Candidate,
        }
    }

    pub fn state(&self) -> MatchState {
        self.state
    }

    /// Moves to `next`, rejecting transitions the state machine does not allow
    pub fn advance(&mut self, next: MatchState) -> Result<(), CrawlError> {
        if !self.state.can_transition_to(next) {
            return Err(CrawlError::InvalidTransition {
                match_id: self.match_id.clone(),
                from: self.state,
                to: next,
            });
        }
        tracing::trace!("{}: {} -> {}", self.match_id, self.state, next);
        self.state = next;
        Ok(())
    }
}

/// Returns true if the match ID belongs to the configured content epoch
///
/// The ID must carry `prefix` followed by a numeric suffix strictly greater
/// than `min_match_id`. Every ID passes when no minimum is configured.
pub fn is_after_threshold(match_id: &str, prefix: &str, min_match_id: Option<u64>) -> bool {
    let Some(min) = min_match_id else {
        return true;
    };

    match_id
        .strip_prefix(prefix)
        .and_then(|suffix| suffix.parse::<u64>().ok())
        .is_some_and(|number| number > min)
}

/// Checks a fetched match against the analysis filters
pub fn check_match(payload: &MatchPayload, crawl: &CrawlConfig) -> Result<(), SkipReason> {
    if payload.end_of_game_result() != Some(GAME_COMPLETE) {
        return Err(SkipReason::Incomplete);
    }
    if payload.queue_id() != Some(crawl.queue_id) {
        return Err(SkipReason::WrongQueue);
    }
    if payload.game_duration() <= crawl.min_duration_secs {
        return Err(SkipReason::TooShort);
    }
    Ok(())
}

/// Lists the player's recent matches that are new and inside the threshold
pub async fn select_candidates(
    api: &RiotApi,
    storage: &dyn Storage,
    crawl: &CrawlConfig,
    player_id: &str,
) -> Result<Vec<String>, CrawlError> {
    let listed = api.match_ids(player_id).await?;
    let listed_count = listed.len();

    let recent: Vec<String> = listed
        .into_iter()
        .filter(|id| is_after_threshold(id, &crawl.region_prefix, crawl.min_match_id))
        .collect();
    let recent_count = recent.len();

    let candidates = storage.filter_unknown_matches(&recent)?;

    tracing::debug!(
        "{}: {} matches listed, {} inside threshold, {} new",
        player_id,
        listed_count,
        recent_count,
        candidates.len()
    );

    Ok(candidates)
}

/// Fetches, filters and persists one candidate match
///
/// Any fetch error propagates and ends the subject's iteration. A storage
/// error inside the transaction aborts it before propagating.
pub async fn ingest_match(
    api: &RiotApi,
    storage: &mut dyn Storage,
    crawl: &CrawlConfig,
    subject: &str,
    match_id: &str,
) -> Result<IngestOutcome, CrawlError> {
    let mut progress = MatchProgress::new(match_id);

    let payload = api.match_payload(match_id).await?;
    progress.advance(MatchState::Fetched)?;

    let verdict = check_match(&payload, crawl);
    progress.advance(MatchState::Filtered)?;

    if let Err(reason) = verdict {
        progress.advance(MatchState::Skipped)?;
        tracing::debug!("Skipping {}: {}", match_id, reason);
        return Ok(IngestOutcome::Skipped(reason));
    }

    let rank_entries = participant_ranks(api, crawl, subject, &payload).await?;
    let fields = payload.match_fields();
    let participants = payload.participant_records();

    with_transaction(storage, |storage, txn| {
        for entry in &rank_entries {
            storage.upsert_rank_record(entry, txn)?;
        }
        storage.insert_match(match_id, &payload.metadata.data_version, &fields, txn)?;
        storage.insert_participants(match_id, &participants, txn)
    })?;
    progress.advance(MatchState::Ingested)?;

    tracing::debug!(
        "Ingested {} with {} participants, {} rank updates",
        match_id,
        participants.len(),
        rank_entries.len()
    );

    Ok(IngestOutcome::Ingested {
        participants: participants.len(),
        rank_updates: rank_entries.len(),
    })
}

/// Fetches primary-queue rank entries for every other human participant
async fn participant_ranks(
    api: &RiotApi,
    crawl: &CrawlConfig,
    subject: &str,
    payload: &MatchPayload,
) -> Result<Vec<RankEntry>, CrawlError> {
    let mut ranks = Vec::new();

    for participant in payload.participant_ids() {
        if participant == subject || participant == crawl.bot_player_id {
            continue;
        }
        let entries = api.rank_entries(participant).await?;
        ranks.extend(
            entries
                .into_iter()
                .filter(|entry| entry.queue_type == crawl.queue_type),
        );
    }

    Ok(ranks)
}

/// Refreshes the subject's own rank entries and retires it from the frontier head
///
/// Returns the number of rank entries written.
pub async fn refresh_player(
    api: &RiotApi,
    storage: &mut dyn Storage,
    player_id: &str,
) -> Result<usize, CrawlError> {
    let entries = api.rank_entries(player_id).await?;

    with_transaction(storage, |storage, txn| {
        for entry in &entries {
            storage.upsert_rank_record(entry, txn)?;
        }
        storage.touch_matches_scanned(player_id, txn)
    })?;

    Ok(entries.len())
}
