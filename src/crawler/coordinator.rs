//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the main crawl loop, including:
//! - Selecting the crawl frontier from storage
//! - Draining each player's new matches before moving on
//! - Refreshing the player's own rank and retiring it from the frontier head
//! - Idling when the frontier is empty and stopping on interrupt

use crate::api::RiotApi;
use crate::config::{Config, CrawlConfig};
use crate::crawler::ingest::{ingest_match, refresh_player, select_candidates, IngestOutcome};
use crate::storage::{open_storage, with_transaction, Storage};
use crate::CrawlError;
use std::future::Future;
use std::time::{Duration, Instant};

/// What one player's crawl iteration did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerSummary {
    pub player_id: String,
    /// New match IDs inside the threshold
    pub candidates: usize,
    pub ingested: usize,
    pub skipped: usize,
    /// Rank entries written, for participants and for the player itself
    pub rank_updates: usize,
}

/// Main crawler structure
///
/// Owns the API client (and through it the process-wide rate limiter) and
/// the storage backend selected at startup. Players are crawled one at a
/// time; within a player, matches are ingested one at a time.
pub struct Crawler {
    crawl: CrawlConfig,
    api: RiotApi,
    storage: Box<dyn Storage>,
}

impl Crawler {
    /// Creates a crawler from configuration
    ///
    /// Resolves the API key and opens the configured storage backend.
    pub fn new(config: &Config) -> Result<Self, CrawlError> {
        let api_key = config.api.resolve_api_key()?;
        let storage = open_storage(&config.storage)?;
        Self::with_storage(config, &api_key, storage)
    }

    /// Creates a crawler over an already opened backend
    pub fn with_storage(
        config: &Config,
        api_key: &str,
        storage: Box<dyn Storage>,
    ) -> Result<Self, CrawlError> {
        Ok(Self {
            crawl: config.crawl.clone(),
            api: RiotApi::from_config(config, api_key)?,
            storage,
        })
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    /// Runs the crawl loop forever
    ///
    /// Returns only on error. Every error is logged here and then returned
    /// so the process terminates instead of retrying unknown failures.
    pub async fn run(&mut self) -> Result<(), CrawlError> {
        let idle = Duration::from_secs(self.crawl.idle_secs);
        let mut passes: u64 = 0;

        tracing::info!(
            "Starting crawl of {} on {} storage",
            self.crawl.queue_type,
            self.storage.backend_name()
        );

        loop {
            let crawled = match self.crawl_pass().await {
                Ok(crawled) => crawled,
                Err(e) => {
                    tracing::error!("Crawl failed: {}", e);
                    return Err(e);
                }
            };
            passes += 1;

            if crawled == 0 {
                tracing::info!(
                    "Frontier is empty, sleeping {}s before reselecting",
                    idle.as_secs()
                );
                tokio::time::sleep(idle).await;
            } else {
                tracing::info!("Pass {} complete: {} players crawled", passes, crawled);
            }
        }
    }

    /// Runs the crawl loop until it fails or `shutdown` resolves
    ///
    /// Shutdown is a clean exit. Storage writes never span an await, so no
    /// transaction is left open when the loop is dropped.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<(), CrawlError>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = shutdown => {
                tracing::info!("Interrupt received, shutting down");
                Ok(())
            }
            result = self.run() => result,
        }
    }

    /// Crawls every player of the current frontier once, in frontier order
    ///
    /// Returns the number of players crawled; zero means the frontier is empty.
    pub async fn crawl_pass(&mut self) -> Result<usize, CrawlError> {
        let frontier = self.storage.select_crawl_frontier(&self.crawl.queue_type)?;
        if frontier.is_empty() {
            return Ok(0);
        }

        tracing::info!("Selected frontier of {} players", frontier.len());
        let start_time = Instant::now();
        let mut matches_ingested = 0;

        for (index, player_id) in frontier.iter().enumerate() {
            let summary = self.crawl_player(player_id).await?;
            matches_ingested += summary.ingested;

            let done = index + 1;
            if done % 10 == 0 || done == frontier.len() {
                let rate = done as f64 / start_time.elapsed().as_secs_f64().max(f64::EPSILON);
                tracing::info!(
                    "Progress: {}/{} players, {} matches ingested, {:.2} players/sec",
                    done,
                    frontier.len(),
                    matches_ingested,
                    rate
                );
            }
        }

        Ok(frontier.len())
    }

    /// Runs one player's full iteration
    ///
    /// All new matches are ingested or skipped first; only then is the
    /// player's own rank refreshed and its scan time advanced.
    pub async fn crawl_player(&mut self, player_id: &str) -> Result<PlayerSummary, CrawlError> {
        let candidates =
            select_candidates(&self.api, self.storage.as_ref(), &self.crawl, player_id).await?;

        let mut summary = PlayerSummary {
            player_id: player_id.to_string(),
            candidates: candidates.len(),
            ..Default::default()
        };

        for match_id in &candidates {
            let outcome = ingest_match(
                &self.api,
                self.storage.as_mut(),
                &self.crawl,
                player_id,
                match_id,
            )
            .await?;

            match outcome {
                IngestOutcome::Ingested { rank_updates, .. } => {
                    summary.ingested += 1;
                    summary.rank_updates += rank_updates;
                }
                IngestOutcome::Skipped(_) => summary.skipped += 1,
            }
        }

        summary.rank_updates += refresh_player(&self.api, self.storage.as_mut(), player_id).await?;

        tracing::debug!(
            "Crawled {}: {} candidates, {} ingested, {} skipped, {} rank updates",
            player_id,
            summary.candidates,
            summary.ingested,
            summary.skipped,
            summary.rank_updates
        );

        Ok(summary)
    }

    /// Adds a player to the head of the frontier
    ///
    /// Fetches and stores the player's rank entries, then resets its scan
    /// time to the epoch. Returns the number of entries stored; a player not
    /// ranked in the primary queue never enters the frontier.
    pub async fn seed_player(&mut self, player_id: &str) -> Result<usize, CrawlError> {
        let entries = self.api.rank_entries(player_id).await?;

        if !entries
            .iter()
            .any(|entry| entry.queue_type == self.crawl.queue_type)
        {
            tracing::warn!(
                "{} is not ranked in {}; it will not be crawled",
                player_id,
                self.crawl.queue_type
            );
        }

        with_transaction(self.storage.as_mut(), |storage, txn| {
            for entry in &entries {
                storage.upsert_rank_record(entry, txn)?;
            }
            storage.reset_matches_scanned(player_id, txn)
        })?;

        tracing::info!("Seeded {} with {} rank entries", player_id, entries.len());
        Ok(entries.len())
    }
}
