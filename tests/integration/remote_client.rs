//! Remote client behaviour against a mocked HTTP source

use assert_matches::assert_matches;
use chrono::Utc;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::{Duration, Instant};
use tempfile::tempdir;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::fixtures;
use funding_collector::api::{CoinglassClient, FundingDataProvider, QueryValue, RemoteClient};
use funding_collector::error::{CollectorError, ErrorKind};
use funding_collector::normalize::normalize_batch;

#[tokio::test]
async fn test_non_2xx_surfaces_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fapi/v1/premiumIndex"))
        .respond_with(ResponseTemplate::new(429).set_body_string("Too many requests; slow down"))
        .mount(&server)
        .await;

    let client = RemoteClient::new("binance", &server.uri(), 600, None, &[]).unwrap();
    let err = client.get("/fapi/v1/premiumIndex", &[]).await.unwrap_err();

    assert_matches!(err, CollectorError::Remote { status: 429, ref body } if body == "Too many requests; slow down");
    assert_eq!(err.kind(), ErrorKind::Transport);
}

#[tokio::test]
async fn test_sequence_query_params_are_joined() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/rates"))
        .and(query_param("symbols", "BTC,ETH,SOL"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = RemoteClient::new("test", &server.uri(), 600, None, &[]).unwrap();
    let body = client
        .get("/v1/rates", &[("symbols", QueryValue::from(vec!["BTC", "ETH", "SOL"]))])
        .await
        .unwrap();

    assert_eq!(body, json!({"ok": true}));
}

#[tokio::test]
async fn test_post_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/info"))
        .and(body_json(json!({"type": "metaAndAssetCtxs"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"universe": []}, []])))
        .expect(1)
        .mount(&server)
        .await;

    let client = RemoteClient::new("hyperliquid", &server.uri(), 600, None, &[]).unwrap();
    let body = client.post_json("/info", &json!({"type": "metaAndAssetCtxs"})).await.unwrap();
    assert_eq!(body[1], json!([]));
}

#[tokio::test]
async fn test_invalid_json_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let client = RemoteClient::new("test", &server.uri(), 600, None, &[]).unwrap();
    let err = client.get("/anything", &[]).await.unwrap_err();
    assert_matches!(err, CollectorError::Decode { .. });
}

#[tokio::test]
async fn test_requests_are_spaced_by_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    // 300 per minute: at least 200ms between requests
    let client = RemoteClient::new("test", &server.uri(), 300, None, &[]).unwrap();
    let started = Instant::now();
    for _ in 0..3 {
        client.get("/x", &[]).await.unwrap();
    }

    assert!(started.elapsed() >= Duration::from_millis(400));
}

#[tokio::test]
async fn test_failed_request_still_counts_for_spacing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let client = RemoteClient::new("test", &server.uri(), 300, None, &[]).unwrap();
    let started = Instant::now();
    assert!(client.get("/x", &[]).await.is_err());
    assert!(client.get("/x", &[]).await.is_err());

    assert!(started.elapsed() >= Duration::from_millis(200));
}

#[tokio::test]
async fn test_aggregator_key_sent_under_every_header_variant() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/futures/funding-rate/exchange-list"))
        .and(header("coinglasssecret", "secret-key"))
        .and(header("cg-api-key", "secret-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "0",
            "msg": "success",
            "data": [{
                "symbol": "BTC",
                "stablecoin_margin_list": [
                    {"exchange": "Binance", "funding_rate": 0.01, "next_funding_time": 1714564800000i64},
                    {"exchange": "OKX", "funding_rate": -0.005}
                ]
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let temp_dir = tempdir().unwrap();
    let config = fixtures::config_for(
        &server.uri(),
        temp_dir.path(),
        &[("ENABLED_SOURCES", "coinglass"), ("COINGLASS_API_KEY", "secret-key")],
    );
    let client = CoinglassClient::new(&config).unwrap();

    let observed_at = Utc::now();
    let raw = client.fetch_funding_rates(observed_at).await.unwrap();
    let rates = normalize_batch(&raw, observed_at);

    assert_eq!(rates.len(), 2);
    assert!((rates[0].rate - 0.0001).abs() < 1e-12);
    assert_eq!(rates[1].exchange, "OKX");
    assert!(rates[1].rate < 0.0);
}

#[tokio::test]
async fn test_aggregator_error_code_is_a_remote_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/futures/funding-rate/exchange-list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": "30001", "msg": "API key missing"})))
        .mount(&server)
        .await;

    let temp_dir = tempdir().unwrap();
    let config = fixtures::config_for(
        &server.uri(),
        temp_dir.path(),
        &[("ENABLED_SOURCES", "coinglass"), ("COINGLASS_API_KEY", "secret-key")],
    );
    let client = CoinglassClient::new(&config).unwrap();

    let err = client.fetch_funding_rates(Utc::now()).await.unwrap_err();
    assert_matches!(err, CollectorError::Remote { status: 200, .. });
}

#[tokio::test]
async fn test_clients_rate_limit_independently() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(2)
        .mount(&server)
        .await;

    // One request per minute each: a shared limiter would hold the second for 60s
    let first = RemoteClient::new("first", &server.uri(), 1, None, &[]).unwrap();
    let second = RemoteClient::new("second", &server.uri(), 1, None, &[]).unwrap();

    first.get("/x", &[]).await.unwrap();
    let started = Instant::now();
    second.get("/x", &[]).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
}
