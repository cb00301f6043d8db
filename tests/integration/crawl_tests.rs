//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the rank and match endpoints
//! and exercise full player iterations against both storage backends.

use rank_crawler::api::{RankEntry, RiotApi};
use rank_crawler::config::{
    ApiConfig, Config, CrawlConfig, RateLimitConfig, RetryConfig, StorageBackend, StorageConfig,
};
use rank_crawler::crawler::{ingest_match, Crawler, FetchError};
use rank_crawler::storage::{
    never_scanned, open_storage, DocumentStorage, SqliteStorage, Storage, StorageError,
    Transaction,
};
use rank_crawler::CrawlError;
use serde_json::{json, Value};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SOLO: &str = "RANKED_SOLO_5x5";
const FLEX: &str = "RANKED_FLEX_SR";

/// Creates a test configuration pointing both API hosts at the mock server
fn create_test_config(base_url: &str, store_path: &str) -> Config {
    Config {
        api: ApiConfig {
            api_key: Some("test-key".to_string()),
            api_key_env: "RIOT_API_KEY".to_string(),
            platform_url: base_url.to_string(),
            regional_url: base_url.to_string(),
            match_page_size: 100,
        },
        rate_limit: RateLimitConfig::default(),
        retry: RetryConfig::default(),
        crawl: CrawlConfig::default(),
        storage: StorageConfig {
            backend: StorageBackend::Sqlite,
            path: store_path.to_string(),
            transactions: true,
        },
    }
}

/// Transactional backends, each in its own file under `dir`
fn transactional_backends(dir: &TempDir) -> Vec<Box<dyn Storage>> {
    vec![
        Box::new(SqliteStorage::new(&dir.path().join("crawl.db")).unwrap()),
        Box::new(DocumentStorage::open(&dir.path().join("crawl-docs"), true).unwrap()),
    ]
}

fn rank_entry(player_id: &str, queue: &str, wins: i64, losses: i64) -> Value {
    json!({
        "leagueId": "league-1",
        "queueType": queue,
        "tier": "GOLD",
        "rank": "II",
        "puuid": player_id,
        "leaguePoints": 55,
        "wins": wins,
        "losses": losses,
        "veteran": false,
        "inactive": false,
        "freshBlood": false,
        "hotStreak": true
    })
}

fn match_payload(match_id: &str, end_of_game: &str, players: &[&str]) -> Value {
    let participants: Vec<Value> = players
        .iter()
        .enumerate()
        .map(|(i, player)| {
            json!({
                "puuid": player,
                "championName": "Ahri",
                "teamId": if i % 2 == 0 { 100 } else { 200 },
                "win": i % 2 == 0,
                "kills": 3,
                "perks": {"styles": []},
                "challenges": {"kda": 2.5}
            })
        })
        .collect();

    json!({
        "metadata": {
            "matchId": match_id,
            "dataVersion": "2",
            "participants": players
        },
        "info": {
            "endOfGameResult": end_of_game,
            "queueId": 420,
            "gameDuration": 1800,
            "gameCreation": 1_733_000_000_000i64,
            "gameVersion": "15.1.1",
            "platformId": "NA1",
            "teams": [{"teamId": 100}, {"teamId": 200}],
            "participants": participants
        }
    })
}

fn seed_record(storage: &mut dyn Storage, player_id: &str, wins: i64, at_head: bool) {
    let entry: RankEntry = serde_json::from_value(rank_entry(player_id, SOLO, wins, 10)).unwrap();
    let none = Transaction::none();
    storage.upsert_rank_record(&entry, &none).unwrap();
    if at_head {
        storage.reset_matches_scanned(player_id, &none).unwrap();
    }
}

async fn mount_json(server: &MockServer, route: &str, body: Value, times: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_player_iteration_end_to_end() {
    let dir = TempDir::new().unwrap();

    for mut storage in transactional_backends(&dir) {
        let mock_server = MockServer::start().await;
        let config = create_test_config(&mock_server.uri(), "unused");
        let backend = storage.backend_name();

        seed_record(storage.as_mut(), "older", 40, false);
        seed_record(storage.as_mut(), "subject", 10, true);

        mount_json(
            &mock_server,
            "/lol/match/v5/matches/by-puuid/subject/ids",
            json!(["NA1_100"]),
            1,
        )
        .await;
        mount_json(
            &mock_server,
            "/lol/match/v5/matches/NA1_100",
            match_payload("NA1_100", "GameComplete", &["subject", "p-two", "BOT"]),
            1,
        )
        .await;
        mount_json(
            &mock_server,
            "/lol/league/v4/entries/by-puuid/p-two",
            json!([rank_entry("p-two", SOLO, 70, 30), rank_entry("p-two", FLEX, 5, 5)]),
            1,
        )
        .await;
        mount_json(
            &mock_server,
            "/lol/league/v4/entries/by-puuid/BOT",
            json!([]),
            0,
        )
        .await;
        mount_json(
            &mock_server,
            "/lol/league/v4/entries/by-puuid/subject",
            json!([rank_entry("subject", SOLO, 11, 10), rank_entry("subject", FLEX, 2, 2)]),
            1,
        )
        .await;

        let frontier = storage.select_crawl_frontier(SOLO).unwrap();
        assert_eq!(frontier.first().map(String::as_str), Some("subject"));

        let mut crawler = Crawler::with_storage(&config, "test-key", storage).unwrap();
        let summary = crawler.crawl_player("subject").await.unwrap();

        assert_eq!(summary.candidates, 1, "{}", backend);
        assert_eq!(summary.ingested, 1);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.rank_updates, 3);

        let storage = crawler.storage();
        assert_eq!(storage.count_matches().unwrap(), 1);
        assert_eq!(storage.count_participants().unwrap(), 3);

        // Participants only get their primary-queue standing
        let p_two = storage.get_player(SOLO, "p-two").unwrap().unwrap();
        assert_eq!(p_two.total_games, 100);
        assert!(storage.get_player(FLEX, "p-two").unwrap().is_none());
        assert!(storage.get_player(SOLO, "BOT").unwrap().is_none());

        // The subject's own entries are stored for every queue
        let subject = storage.get_player(SOLO, "subject").unwrap().unwrap();
        assert_eq!(subject.wins, 11);
        assert!(subject.matches_updated_at > never_scanned());
        assert!(storage.get_player(FLEX, "subject").unwrap().is_some());

        let frontier = storage.select_crawl_frontier(SOLO).unwrap();
        assert_eq!(frontier, vec!["older", "p-two", "subject"], "{}", backend);

        assert!(storage
            .filter_unknown_matches(&["NA1_100".to_string()])
            .unwrap()
            .is_empty());
    }
}

#[tokio::test]
async fn test_incomplete_match_is_skipped_without_writes() {
    let dir = TempDir::new().unwrap();

    for mut storage in transactional_backends(&dir) {
        let mock_server = MockServer::start().await;
        let config = create_test_config(&mock_server.uri(), "unused");
        seed_record(storage.as_mut(), "subject", 10, true);

        mount_json(
            &mock_server,
            "/lol/match/v5/matches/by-puuid/subject/ids",
            json!(["NA1_300"]),
            1,
        )
        .await;
        mount_json(
            &mock_server,
            "/lol/match/v5/matches/NA1_300",
            match_payload("NA1_300", "Abort_TooFewPlayers", &["subject", "p-two"]),
            1,
        )
        .await;
        mount_json(
            &mock_server,
            "/lol/league/v4/entries/by-puuid/p-two",
            json!([rank_entry("p-two", SOLO, 1, 1)]),
            0,
        )
        .await;
        mount_json(
            &mock_server,
            "/lol/league/v4/entries/by-puuid/subject",
            json!([rank_entry("subject", SOLO, 10, 10)]),
            1,
        )
        .await;

        let mut crawler = Crawler::with_storage(&config, "test-key", storage).unwrap();
        let summary = crawler.crawl_player("subject").await.unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.ingested, 0);

        let storage = crawler.storage();
        assert_eq!(storage.count_matches().unwrap(), 0);
        assert_eq!(storage.count_participants().unwrap(), 0);
        assert!(storage.get_player(SOLO, "p-two").unwrap().is_none());

        // The player is still retired from the frontier head
        let subject = storage.get_player(SOLO, "subject").unwrap().unwrap();
        assert!(subject.matches_updated_at > never_scanned());
    }
}

#[tokio::test]
async fn test_failed_match_insert_rolls_back_participant_ranks() {
    let dir = TempDir::new().unwrap();

    for mut storage in transactional_backends(&dir) {
        let mock_server = MockServer::start().await;
        let config = create_test_config(&mock_server.uri(), "unused");

        let fields = json!({"queueId": 420}).as_object().cloned().unwrap();
        storage
            .insert_match("NA1_400", "2", &fields, &Transaction::none())
            .unwrap();

        mount_json(
            &mock_server,
            "/lol/match/v5/matches/NA1_400",
            match_payload("NA1_400", "GameComplete", &["subject", "p-two"]),
            1,
        )
        .await;
        mount_json(
            &mock_server,
            "/lol/league/v4/entries/by-puuid/p-two",
            json!([rank_entry("p-two", SOLO, 9, 9)]),
            1,
        )
        .await;

        let api = RiotApi::from_config(&config, "test-key").unwrap();
        let err = ingest_match(&api, storage.as_mut(), &config.crawl, "subject", "NA1_400")
            .await
            .unwrap_err();

        assert!(
            matches!(
                err,
                CrawlError::Storage(StorageError::DuplicateMatch(ref id)) if id == "NA1_400"
            ),
            "{}",
            err
        );
        assert!(storage.get_player(SOLO, "p-two").unwrap().is_none());
        assert_eq!(storage.count_matches().unwrap(), 1);
        assert_eq!(storage.count_participants().unwrap(), 0);

        // The aborted scope does not block later writes
        let txn = storage.begin_transaction().unwrap();
        storage.commit_transaction(txn).unwrap();
    }
}

#[tokio::test]
async fn test_non_transactional_backend_keeps_earlier_writes() {
    let mock_server = MockServer::start().await;
    let config = create_test_config(&mock_server.uri(), "unused");
    let mut storage = DocumentStorage::in_memory(false).unwrap();

    let fields = json!({"queueId": 420}).as_object().cloned().unwrap();
    storage
        .insert_match("NA1_401", "2", &fields, &Transaction::none())
        .unwrap();

    mount_json(
        &mock_server,
        "/lol/match/v5/matches/NA1_401",
        match_payload("NA1_401", "GameComplete", &["subject", "p-two"]),
        1,
    )
    .await;
    mount_json(
        &mock_server,
        "/lol/league/v4/entries/by-puuid/p-two",
        json!([rank_entry("p-two", SOLO, 9, 9)]),
        1,
    )
    .await;

    let api = RiotApi::from_config(&config, "test-key").unwrap();
    let result = ingest_match(&api, &mut storage, &config.crawl, "subject", "NA1_401").await;

    assert!(result.is_err());
    assert!(!storage.supports_transactions());
    assert!(storage.get_player(SOLO, "p-two").unwrap().is_some());
}

#[tokio::test]
async fn test_threshold_and_dedup_limit_fetches() {
    let dir = TempDir::new().unwrap();
    let mock_server = MockServer::start().await;
    let mut config = create_test_config(&mock_server.uri(), "unused");
    config.crawl.min_match_id = Some(100);

    let mut storage = SqliteStorage::new(&dir.path().join("crawl.db")).unwrap();
    seed_record(&mut storage, "subject", 10, true);
    let fields = json!({"queueId": 420}).as_object().cloned().unwrap();
    storage
        .insert_match("NA1_200", "2", &fields, &Transaction::none())
        .unwrap();

    mount_json(
        &mock_server,
        "/lol/match/v5/matches/by-puuid/subject/ids",
        json!(["NA1_200", "NA1_150", "NA1_50", "EUW1_999"]),
        1,
    )
    .await;
    mount_json(
        &mock_server,
        "/lol/match/v5/matches/NA1_150",
        match_payload("NA1_150", "GameComplete", &["subject"]),
        1,
    )
    .await;
    for skipped in ["NA1_200", "NA1_50", "EUW1_999"] {
        mount_json(
            &mock_server,
            &format!("/lol/match/v5/matches/{}", skipped),
            json!({}),
            0,
        )
        .await;
    }
    mount_json(
        &mock_server,
        "/lol/league/v4/entries/by-puuid/subject",
        json!([rank_entry("subject", SOLO, 10, 10)]),
        1,
    )
    .await;

    let mut crawler = Crawler::with_storage(&config, "test-key", Box::new(storage)).unwrap();
    let summary = crawler.crawl_player("subject").await.unwrap();

    assert_eq!(summary.candidates, 1);
    assert_eq!(summary.ingested, 1);
    assert_eq!(crawler.storage().count_matches().unwrap(), 2);
}

#[tokio::test]
async fn test_match_fetch_failure_aborts_player_iteration() {
    let dir = TempDir::new().unwrap();
    let mock_server = MockServer::start().await;
    let config = create_test_config(&mock_server.uri(), "unused");

    let mut storage = SqliteStorage::new(&dir.path().join("crawl.db")).unwrap();
    seed_record(&mut storage, "subject", 10, true);

    mount_json(
        &mock_server,
        "/lol/match/v5/matches/by-puuid/subject/ids",
        json!(["NA1_1", "NA1_2"]),
        1,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/lol/match/v5/matches/NA1_1"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_json(&mock_server, "/lol/match/v5/matches/NA1_2", json!({}), 0).await;
    mount_json(
        &mock_server,
        "/lol/league/v4/entries/by-puuid/subject",
        json!([]),
        0,
    )
    .await;

    let mut crawler = Crawler::with_storage(&config, "test-key", Box::new(storage)).unwrap();
    let err = crawler.crawl_player("subject").await.unwrap_err();

    assert!(matches!(
        err,
        CrawlError::Fetch(FetchError::Upstream { status: 500, .. })
    ));

    // Scan time was never advanced, so the player stays at the head
    let subject = crawler.storage().get_player(SOLO, "subject").unwrap().unwrap();
    assert_eq!(subject.matches_updated_at, never_scanned());
}

#[tokio::test]
async fn test_run_fails_fast_on_unauthorized() {
    let dir = TempDir::new().unwrap();
    let mock_server = MockServer::start().await;
    let config = create_test_config(&mock_server.uri(), "unused");

    let mut storage = SqliteStorage::new(&dir.path().join("crawl.db")).unwrap();
    seed_record(&mut storage, "subject", 10, true);

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut crawler = Crawler::with_storage(&config, "test-key", Box::new(storage)).unwrap();
    let err = crawler.run().await.unwrap_err();

    assert!(matches!(err, CrawlError::Fetch(FetchError::Unauthorized { .. })));
}

#[tokio::test]
async fn test_seed_player_goes_to_frontier_head() {
    let dir = TempDir::new().unwrap();
    let mock_server = MockServer::start().await;
    let config = create_test_config(&mock_server.uri(), "unused");

    let mut storage = SqliteStorage::new(&dir.path().join("crawl.db")).unwrap();
    seed_record(&mut storage, "veteran", 500, true);
    storage
        .touch_matches_scanned("veteran", &Transaction::none())
        .unwrap();

    mount_json(
        &mock_server,
        "/lol/league/v4/entries/by-puuid/newcomer",
        json!([rank_entry("newcomer", SOLO, 3, 2)]),
        1,
    )
    .await;

    let mut crawler = Crawler::with_storage(&config, "test-key", Box::new(storage)).unwrap();
    assert_eq!(crawler.seed_player("newcomer").await.unwrap(), 1);

    let frontier = crawler.storage().select_crawl_frontier(SOLO).unwrap();
    assert_eq!(frontier, vec!["newcomer", "veteran"]);
}

#[tokio::test]
async fn test_crawler_from_config_opens_document_store() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("crawl-docs");
    let mock_server = MockServer::start().await;

    let mut config = create_test_config(&mock_server.uri(), store.to_str().unwrap());
    config.storage.backend = StorageBackend::Document;

    mount_json(
        &mock_server,
        "/lol/league/v4/entries/by-puuid/seeded",
        json!([rank_entry("seeded", SOLO, 3, 2)]),
        1,
    )
    .await;

    {
        let mut crawler = Crawler::new(&config).unwrap();
        assert_eq!(crawler.storage().backend_name(), "document");
        crawler.seed_player("seeded").await.unwrap();
    }

    let reopened = DocumentStorage::open(&store, true).unwrap();
    assert_eq!(reopened.select_crawl_frontier(SOLO).unwrap(), vec!["seeded"]);
}

#[tokio::test]
async fn test_shutdown_ends_run_cleanly() {
    let mock_server = MockServer::start().await;
    let config = create_test_config(&mock_server.uri(), "unused");

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let mut storage = DocumentStorage::in_memory(true).unwrap();
    seed_record(&mut storage, "subject", 10, true);

    let mut crawler = Crawler::with_storage(&config, "test-key", Box::new(storage)).unwrap();
    assert!(crawler.run_until(async {}).await.is_ok());
}

#[tokio::test]
async fn test_pass_drains_players_in_frontier_order() {
    let dir = TempDir::new().unwrap();

    for mut storage in transactional_backends(&dir) {
        let mock_server = MockServer::start().await;
        let config = create_test_config(&mock_server.uri(), "unused");
        let backend = storage.backend_name();

        // Both at the head of the frontier; more games goes first
        seed_record(storage.as_mut(), "alpha", 40, true);
        seed_record(storage.as_mut(), "beta", 10, true);

        mount_json(
            &mock_server,
            "/lol/match/v5/matches/by-puuid/alpha/ids",
            json!(["NA1_10"]),
            1,
        )
        .await;
        mount_json(
            &mock_server,
            "/lol/match/v5/matches/NA1_10",
            match_payload("NA1_10", "GameComplete", &["alpha"]),
            1,
        )
        .await;
        mount_json(
            &mock_server,
            "/lol/league/v4/entries/by-puuid/alpha",
            json!([rank_entry("alpha", SOLO, 41, 10)]),
            1,
        )
        .await;
        mount_json(
            &mock_server,
            "/lol/match/v5/matches/by-puuid/beta/ids",
            json!([]),
            1,
        )
        .await;
        mount_json(
            &mock_server,
            "/lol/league/v4/entries/by-puuid/beta",
            json!([rank_entry("beta", SOLO, 10, 10)]),
            1,
        )
        .await;

        let mut crawler = Crawler::with_storage(&config, "test-key", storage).unwrap();
        assert_eq!(crawler.crawl_pass().await.unwrap(), 2, "{}", backend);

        let paths: Vec<String> = mock_server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|request| request.url.path().to_string())
            .collect();
        assert_eq!(
            paths,
            vec![
                "/lol/match/v5/matches/by-puuid/alpha/ids",
                "/lol/match/v5/matches/NA1_10",
                "/lol/league/v4/entries/by-puuid/alpha",
                "/lol/match/v5/matches/by-puuid/beta/ids",
                "/lol/league/v4/entries/by-puuid/beta",
            ],
            "{}",
            backend
        );

        // Alpha was retired from the head before beta started
        let storage = crawler.storage();
        let alpha = storage.get_player(SOLO, "alpha").unwrap().unwrap();
        let beta = storage.get_player(SOLO, "beta").unwrap().unwrap();
        assert!(alpha.matches_updated_at > never_scanned());
        assert!(beta.matches_updated_at > alpha.matches_updated_at);
        assert_eq!(alpha.wins, 41);

        assert_eq!(storage.count_matches().unwrap(), 1);
        assert_eq!(
            storage.select_crawl_frontier(SOLO).unwrap(),
            vec!["alpha", "beta"]
        );
    }
}

#[tokio::test]
async fn test_shutdown_mid_fetch_leaves_store_consistent() {
    let dir = TempDir::new().unwrap();

    for backend in [StorageBackend::Sqlite, StorageBackend::Document] {
        let mock_server = MockServer::start().await;
        let store = dir.path().join(format!("interrupted-{:?}", backend));
        let mut config = create_test_config(&mock_server.uri(), store.to_str().unwrap());
        config.storage.backend = backend;

        {
            let mut storage = open_storage(&config.storage).unwrap();
            seed_record(storage.as_mut(), "subject", 10, true);
        }

        mount_json(
            &mock_server,
            "/lol/match/v5/matches/by-puuid/subject/ids",
            json!(["NA1_700"]),
            1,
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/lol/match/v5/matches/NA1_700"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(match_payload("NA1_700", "GameComplete", &["subject"]))
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&mock_server)
            .await;

        {
            let mut crawler = Crawler::new(&config).unwrap();
            let result = crawler
                .run_until(tokio::time::sleep(Duration::from_millis(300)))
                .await;
            assert!(result.is_ok());
        }

        let mut storage = open_storage(&config.storage).unwrap();
        assert_eq!(storage.count_matches().unwrap(), 0);
        let subject = storage.get_player(SOLO, "subject").unwrap().unwrap();
        assert_eq!(subject.matches_updated_at, never_scanned());

        let txn = storage.begin_transaction().unwrap();
        assert!(txn.is_active());
        storage.commit_transaction(txn).unwrap();
    }
}
