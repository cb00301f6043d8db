//! Upstream game-data API client
//!
//! Three read-only endpoints, all fetched through the [`RetryingFetcher`]:
//! - rank entries of a player (platform host)
//! - recent match IDs of a player (regional host)
//! - a full match payload (regional host)

mod models;

pub use models::{
    Document, MatchMetadata, MatchPayload, RankEntry, GAME_COMPLETE, MATCH_EXCLUDED_FIELDS,
    PARTICIPANT_EXCLUDED_FIELDS,
};

use crate::config::{ApiConfig, Config};
use crate::crawler::RetryingFetcher;
use crate::CrawlError;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

/// Client for the rank and match endpoints
pub struct RiotApi {
    fetcher: RetryingFetcher,
    platform_url: Url,
    regional_url: Url,
    match_page_size: u32,
}

impl RiotApi {
    /// Creates a client over an existing fetcher
    pub fn new(fetcher: RetryingFetcher, config: &ApiConfig) -> Result<Self, CrawlError> {
        Ok(Self {
            fetcher,
            platform_url: Url::parse(&config.platform_url)?,
            regional_url: Url::parse(&config.regional_url)?,
            match_page_size: config.match_page_size,
        })
    }

    /// Builds the client, its fetcher and its rate limiter from configuration
    pub fn from_config(config: &Config, api_key: &str) -> Result<Self, CrawlError> {
        let fetcher = RetryingFetcher::from_config(api_key, &config.rate_limit, &config.retry)?;
        Self::new(fetcher, &config.api)
    }

    /// The fetcher used for every request
    pub fn fetcher(&self) -> &RetryingFetcher {
        &self.fetcher
    }

    /// Fetches all rank entries of a player, one per queue they are ranked in
    pub async fn rank_entries(&self, player_id: &str) -> Result<Vec<RankEntry>, CrawlError> {
        let url = endpoint(
            &self.platform_url,
            &["lol", "league", "v4", "entries", "by-puuid", player_id],
        )?;
        let value = self.fetcher.fetch(&url).await?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        decode(value, || format!("rank entries of {}", player_id))
    }

    /// Fetches the most recent page of match IDs of a player
    pub async fn match_ids(&self, player_id: &str) -> Result<Vec<String>, CrawlError> {
        let mut url = endpoint(
            &self.regional_url,
            &["lol", "match", "v5", "matches", "by-puuid", player_id, "ids"],
        )?;
        url.query_pairs_mut()
            .append_pair("start", "0")
            .append_pair("count", &self.match_page_size.to_string());

        let value = self.fetcher.fetch(&url).await?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        decode(value, || format!("match list of {}", player_id))
    }

    /// Fetches a full match payload
    pub async fn match_payload(&self, match_id: &str) -> Result<MatchPayload, CrawlError> {
        let url = endpoint(
            &self.regional_url,
            &["lol", "match", "v5", "matches", match_id],
        )?;
        let value = self.fetcher.fetch(&url).await?;
        decode(value, || format!("match {}", match_id))
    }
}

/// Appends percent-encoded path segments to a base URL
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, CrawlError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn decode<T, F>(value: Value, context: F) -> Result<T, CrawlError>
where
    T: DeserializeOwned,
    F: FnOnce() -> String,
{
    serde_json::from_value(value).map_err(|source| CrawlError::Payload {
        context: context(),
        source,
    })
}
