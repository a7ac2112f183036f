//! Normalization of raw source records into canonical [`FundingRate`]s
//!
//! Sources disagree on symbol conventions (`BTCUSDT`, `BTC-PERP`, `kPEPE`,
//! `BTC/USDT:USDT`) and on whether numbers arrive as strings. Everything is
//! mapped onto one canonical asset key here so records describing the same
//! instrument can be joined across exchanges.

use chrono::{DateTime, SubsecRound, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{CollectorError, CollectorResult};
use crate::models::{Direction, FundingRate, RateUnit, RawFundingRecord};

/// Perpetual-market markers, checked before quote currencies
const MARKET_SUFFIXES: [&str; 5] = ["-PERP", "_PERP", "PERP", "-SWAP", "_SWAP"];

/// Quote currencies, longest first so `FDUSD` wins over `USD`
const QUOTE_SUFFIXES: [&str; 6] = ["FDUSD", "USDT", "USDC", "BUSD", "TUSD", "USD"];

/// Contract-size multipliers some venues prepend (`1000PEPEUSDT`)
const MULTIPLIER_PREFIXES: [&str; 3] = ["1000000", "10000", "1000"];

/// Map an exchange symbol onto its canonical asset key
///
/// Returns `None` when nothing usable is left.
pub fn normalize_symbol(raw: &str) -> Option<String> {
    let mut symbol = raw.trim();

    // Unified notation: BTC/USDT:USDT
    if let Some((base, _settle)) = symbol.split_once(':') {
        symbol = base;
    }

    // Hyperliquid marks 1000x contracts with a lowercase k (kPEPE)
    let mut owned = if symbol.len() > 1
        && symbol.starts_with('k')
        && symbol[1..].chars().next().is_some_and(|c| c.is_ascii_uppercase())
    {
        symbol[1..].to_string()
    } else {
        symbol.to_string()
    };
    owned = owned.to_uppercase();

    for suffix in MARKET_SUFFIXES {
        if let Some(stripped) = owned.strip_suffix(suffix) {
            if !stripped.is_empty() {
                owned = stripped.to_string();
                break;
            }
        }
    }

    // Separated pairs keep the base only: BTC-USDT, ETH_USDC, SOL/USD
    if let Some(base) = owned.split(['-', '_', '/']).next() {
        if !base.is_empty() {
            owned = base.to_string();
        }
    }

    for suffix in QUOTE_SUFFIXES {
        if let Some(stripped) = owned.strip_suffix(suffix) {
            if !stripped.is_empty() {
                owned = stripped.to_string();
                break;
            }
        }
    }

    for prefix in MULTIPLIER_PREFIXES {
        if let Some(stripped) = owned.strip_prefix(prefix) {
            if stripped.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
                owned = stripped.to_string();
                break;
            }
        }
    }

    let owned: String = owned.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    if owned.is_empty() {
        None
    } else {
        Some(owned)
    }
}

/// Read a number sent either as a JSON number or a numeric string
pub fn parse_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

fn millis_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}

/// Validate and convert one raw record
///
/// `fallback_timestamp` is used when the source did not report a time; the
/// caller passes the scheduled instant of the tick so that retries of the
/// same tick produce the same natural key.
pub fn normalize_record(raw: &RawFundingRecord, fallback_timestamp: DateTime<Utc>) -> CollectorResult<FundingRate> {
    let asset = normalize_symbol(&raw.symbol)
        .ok_or_else(|| CollectorError::validation(&raw.exchange, format!("unusable symbol '{}'", raw.symbol)))?;

    if raw.exchange.trim().is_empty() {
        return Err(CollectorError::validation(&raw.exchange, "missing exchange"));
    }

    let scale = match raw.rate_unit {
        RateUnit::Fraction => 1.0,
        RateUnit::Percent => 0.01,
    };

    let rate = raw
        .funding_rate
        .as_ref()
        .and_then(parse_number)
        .map(|r| r * scale)
        .ok_or_else(|| CollectorError::validation(&raw.exchange, format!("missing or invalid funding rate for {}", raw.symbol)))?;

    let timestamp = match raw.timestamp_ms {
        Some(ms) => millis_to_datetime(ms)
            .ok_or_else(|| CollectorError::validation(&raw.exchange, format!("invalid timestamp {}", ms)))?,
        None => fallback_timestamp.trunc_subsecs(0),
    };

    Ok(FundingRate {
        asset,
        exchange: raw.exchange.trim().to_string(),
        rate,
        predicted_rate: raw.predicted_rate.as_ref().and_then(parse_number).map(|r| r * scale),
        timestamp,
        direction: Direction::from_rate(rate),
        next_funding_time: raw.next_funding_time_ms.and_then(millis_to_datetime),
        open_interest: raw.open_interest.as_ref().and_then(parse_number),
        mark_price: raw.mark_price.as_ref().and_then(parse_number),
        volume_24h: raw.volume_24h.as_ref().and_then(parse_number),
    })
}

/// Normalize a batch, skipping records that fail validation
pub fn normalize_batch(raw: &[RawFundingRecord], fallback_timestamp: DateTime<Utc>) -> Vec<FundingRate> {
    let mut rates = Vec::with_capacity(raw.len());
    let mut skipped = 0usize;

    for record in raw {
        match normalize_record(record, fallback_timestamp) {
            Ok(rate) => rates.push(rate),
            Err(e) => {
                skipped += 1;
                debug!("Skipping record: {}", e);
            }
        }
    }

    if skipped > 0 {
        warn!("Skipped {} of {} records that failed validation", skipped, raw.len());
    }

    rates
}
