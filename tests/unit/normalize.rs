//! Symbol normalization and record validation

use pretty_assertions::assert_eq;
use serde_json::json;

use crate::common::test_data;
use funding_collector::error::ErrorKind;
use funding_collector::models::{Direction, RateUnit, RawFundingRecord};
use funding_collector::normalize::{normalize_batch, normalize_record, normalize_symbol};

#[test]
fn test_same_asset_from_different_sources_shares_a_key() {
    let binance = normalize_symbol("BTCUSDT");
    let hyperliquid = normalize_symbol("BTC-PERP");

    assert_eq!(binance.as_deref(), Some("BTC"));
    assert_eq!(binance, hyperliquid);
}

#[test]
fn test_exchange_specific_spellings() {
    let cases = [
        ("ETH_USDT", "ETH"),
        ("eth-usdt-swap", "ETH"),
        ("SOL/USDT:USDT", "SOL"),
        ("1000PEPEUSDT", "PEPE"),
        ("kPEPE", "PEPE"),
        ("DOGEUSDC", "DOGE"),
        ("XRPBUSD", "XRP"),
    ];
    for (raw, expected) in cases {
        assert_eq!(normalize_symbol(raw).as_deref(), Some(expected), "symbol {}", raw);
    }
}

#[test]
fn test_unusable_symbols() {
    assert_eq!(normalize_symbol(""), None);
    assert_eq!(normalize_symbol("---"), None);
}

#[test]
fn test_percent_rates_become_fractions() {
    let mut raw = RawFundingRecord::new("BTC", "OKX", Some(json!(0.01)));
    raw.rate_unit = RateUnit::Percent;

    let rate = normalize_record(&raw, test_data::t0()).unwrap();
    assert!((rate.rate - 0.0001).abs() < 1e-12);
    assert_eq!(rate.direction, Direction::PayLong);
}

#[test]
fn test_missing_rate_is_a_validation_error() {
    let raw = RawFundingRecord::new("BTCUSDT", "Binance", Some(json!("not-a-number")));
    let err = normalize_record(&raw, test_data::t0()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn test_batch_keeps_good_records() {
    let raw = vec![
        RawFundingRecord::new("BTCUSDT", "Binance", Some(json!("-0.0002"))),
        RawFundingRecord::new("ETHUSDT", "Binance", None),
        RawFundingRecord::new("SOLUSDT", "Binance", Some(json!(0.0003))),
    ];

    let rates = normalize_batch(&raw, test_data::t0());
    let assets: Vec<&str> = rates.iter().map(|r| r.asset.as_str()).collect();
    assert_eq!(assets, vec!["BTC", "SOL"]);
    assert_eq!(rates[0].direction, Direction::PayShort);
    assert!(rates.iter().all(|r| r.timestamp == test_data::t0()));
}
