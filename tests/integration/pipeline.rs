//! Mocked exchanges -> SQLite -> snapshot history, driven by the orchestrator

use chrono::TimeDelta;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use tempfile::tempdir;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{fixtures, logging, test_data};
use funding_collector::database::RateStore;
use funding_collector::pipeline::{build_jobs, register_jobs, ANALYSIS_JOB};
use funding_collector::retention::{RetentionPolicy, SnapshotStore};
use funding_collector::scheduler::{ManualClock, Orchestrator, OrchestratorOptions};

async fn mount_exchanges(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/fapi/v1/premiumIndex"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "symbol": "BTCUSDT",
                "markPrice": "65000.10",
                "lastFundingRate": "0.00010000",
                "nextFundingTime": 1714564800000i64,
                "time": 1714560000000i64
            },
            {
                "symbol": "ETHUSDT",
                "markPrice": "3000.00",
                "lastFundingRate": "-0.00025000",
                "nextFundingTime": 1714564800000i64,
                "time": 1714560000000i64
            },
            {
                "symbol": "BROKENUSDT",
                "lastFundingRate": "",
                "time": 1714560000000i64
            }
        ])))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/info"))
        .and(body_json(json!({"type": "metaAndAssetCtxs"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"universe": [{"name": "BTC"}, {"name": "kPEPE"}]},
            [
                {"funding": "0.0000125", "openInterest": "1200.5", "markPx": "65010.0", "dayNtlVlm": "1000000.0"},
                {"funding": "-0.00003", "openInterest": "5000000", "markPx": "0.0102", "dayNtlVlm": "25000.0"}
            ]
        ])))
        .mount(server)
        .await;
}

struct Harness {
    orchestrator: Orchestrator,
    clock: ManualClock,
    store: RateStore,
    snapshots: Arc<SnapshotStore>,
    _dir: tempfile::TempDir,
}

async fn harness(server: &MockServer, extra: &[(&str, &str)]) -> Harness {
    let temp_dir = tempdir().unwrap();
    let config = fixtures::config_for(&server.uri(), temp_dir.path(), extra);
    let store = RateStore::new(&config.database_path).await.unwrap();
    let snapshots = Arc::new(SnapshotStore::new(
        config.snapshot_dir.clone(),
        RetentionPolicy {
            max_history_items: config.history_limit,
        },
    ));

    let clock = ManualClock::new(test_data::t0());
    let mut orchestrator = Orchestrator::new(OrchestratorOptions {
        clock: clock.clock(),
        ..OrchestratorOptions::default()
    });
    let jobs = build_jobs(&config, store.clone(), snapshots.clone()).unwrap();
    register_jobs(&mut orchestrator, jobs).unwrap();

    Harness {
        orchestrator,
        clock,
        store,
        snapshots,
        _dir: temp_dir,
    }
}

#[tokio::test]
async fn test_one_tick_collects_and_snapshots() {
    logging::init_test_logging();
    let server = MockServer::start().await;
    mount_exchanges(&server).await;
    let mut h = harness(&server, &[]).await;

    let report = h.orchestrator.tick().await;
    assert_eq!(
        report.succeeded,
        vec!["binance-rates".to_string(), "hyperliquid-rates".to_string(), ANALYSIS_JOB.to_string()]
    );

    // BROKENUSDT has no usable rate and is skipped
    assert_eq!(h.store.count().await.unwrap(), 4);

    let snapshot = h.snapshots.get_latest().await.unwrap().unwrap();
    assert_eq!(snapshot.statistics.total_rates, 4);
    assert_eq!(snapshot.statistics.assets, 3);
    assert_eq!(snapshot.statistics.exchanges, 2);
    assert_eq!(snapshot.statistics.negative_rates, 2);
    assert_eq!(snapshot.top_opportunities[0].asset, "ETH");
    assert_eq!(snapshot.top_opportunities[0].exchange, "Binance");

    let hyperliquid: Vec<_> = h
        .store
        .latest_rates(None)
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.exchange == "Hyperliquid")
        .collect();
    assert!(hyperliquid.iter().any(|r| r.asset == "PEPE"));
    assert!(hyperliquid.iter().all(|r| r.timestamp == test_data::t0()));
}

#[tokio::test]
async fn test_rerunning_a_tick_does_not_duplicate_rows() {
    let server = MockServer::start().await;
    mount_exchanges(&server).await;
    let mut h = harness(&server, &[]).await;

    let scheduled_at = h.clock.now();
    assert!(h.orchestrator.execute_job("binance-rates", scheduled_at).await.unwrap());
    assert!(h.orchestrator.execute_job("hyperliquid-rates", scheduled_at).await.unwrap());
    let first = h.store.count().await.unwrap();

    // Same scheduled instant, as a late retry of the same tick would see
    assert!(h.orchestrator.execute_job("binance-rates", scheduled_at).await.unwrap());
    assert!(h.orchestrator.execute_job("hyperliquid-rates", scheduled_at).await.unwrap());

    assert_eq!(h.store.count().await.unwrap(), first);
}

#[tokio::test]
async fn test_analysis_waits_for_failing_source() {
    let server = MockServer::start().await;
    mount_exchanges(&server).await;
    let mut h = harness(&server, &[("ENABLED_SOURCES", "binance,hyperliquid"), ("RETRY_COUNT", "2")]).await;

    h.orchestrator.tick().await;
    assert_eq!(h.snapshots.list().await.unwrap().len(), 1);

    // Binance goes down; its last success ages out after 2 x 300s
    server.reset().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    h.clock.advance(TimeDelta::seconds(700));
    let report = h.orchestrator.tick().await;

    assert_eq!(report.failed, vec!["binance-rates".to_string(), "hyperliquid-rates".to_string()]);
    assert_eq!(report.skipped, vec![ANALYSIS_JOB.to_string()]);
    assert_eq!(h.orchestrator.status("binance-rates").unwrap().consecutive_error_count, 2);
    assert_eq!(h.snapshots.list().await.unwrap().len(), 1);
}
