use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::CollectorError;

/// Which side pays funding for a given rate
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    PayShort,
    PayLong,
}

impl Direction {
    pub fn from_rate(rate: f64) -> Self {
        if rate < 0.0 {
            Direction::PayShort
        } else {
            Direction::PayLong
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::PayShort => "pay-short",
            Direction::PayLong => "pay-long",
        }
    }
}

impl FromStr for Direction {
    type Err = CollectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pay-short" => Ok(Direction::PayShort),
            "pay-long" => Ok(Direction::PayLong),
            other => Err(CollectorError::Config(format!("unknown direction '{}'", other))),
        }
    }
}

/// Canonical funding rate record shared by every source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FundingRate {
    pub asset: String,
    pub exchange: String,
    pub rate: f64,
    pub predicted_rate: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub next_funding_time: Option<DateTime<Utc>>,
    pub open_interest: Option<f64>,
    pub mark_price: Option<f64>,
    pub volume_24h: Option<f64>,
}

impl FundingRate {
    /// Create a record with the direction derived from `rate`
    pub fn new(asset: &str, exchange: &str, rate: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            asset: asset.to_string(),
            exchange: exchange.to_string(),
            rate,
            predicted_rate: None,
            timestamp,
            direction: Direction::from_rate(rate),
            next_funding_time: None,
            open_interest: None,
            mark_price: None,
            volume_24h: None,
        }
    }

    /// Natural key used for idempotent upserts
    pub fn key(&self) -> (&str, &str, i64) {
        (&self.asset, &self.exchange, self.timestamp.timestamp_millis())
    }
}

/// Unit a source reports its funding rate in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateUnit {
    Fraction,
    Percent,
}

/// Source record before normalization and validation
///
/// Numeric fields are kept as raw JSON values because sources disagree on
/// whether they send strings or numbers.
#[derive(Debug, Clone)]
pub struct RawFundingRecord {
    pub symbol: String,
    pub exchange: String,
    pub rate_unit: RateUnit,
    pub funding_rate: Option<Value>,
    pub predicted_rate: Option<Value>,
    pub timestamp_ms: Option<i64>,
    pub next_funding_time_ms: Option<i64>,
    pub open_interest: Option<Value>,
    pub mark_price: Option<Value>,
    pub volume_24h: Option<Value>,
}

impl RawFundingRecord {
    pub fn new(symbol: &str, exchange: &str, funding_rate: Option<Value>) -> Self {
        Self {
            symbol: symbol.to_string(),
            exchange: exchange.to_string(),
            rate_unit: RateUnit::Fraction,
            funding_rate,
            predicted_rate: None,
            timestamp_ms: None,
            next_funding_time_ms: None,
            open_interest: None,
            mark_price: None,
            volume_24h: None,
        }
    }
}

/// Aggregate figures for one snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotStatistics {
    pub total_rates: usize,
    pub positive_rates: usize,
    pub negative_rates: usize,
    pub assets: usize,
    pub exchanges: usize,
    pub average_rate: f64,
}

/// One persisted result of an analysis cycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSnapshot {
    pub timestamp: DateTime<Utc>,
    pub top_opportunities: Vec<FundingRate>,
    pub statistics: SnapshotStatistics,
}

/// Upstream data sources the collector knows how to poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Binance,
    Hyperliquid,
    Coinglass,
}

impl SourceKind {
    /// Identifier used in configuration and job names
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Binance => "binance",
            SourceKind::Hyperliquid => "hyperliquid",
            SourceKind::Coinglass => "coinglass",
        }
    }

    /// Exchange label stored on records coming directly from this source
    pub fn exchange_label(&self) -> &'static str {
        match self {
            SourceKind::Binance => "Binance",
            SourceKind::Hyperliquid => "Hyperliquid",
            SourceKind::Coinglass => "CoinGlass",
        }
    }

    pub fn job_name(&self) -> String {
        format!("{}-rates", self.as_str())
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = CollectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "binance" => Ok(SourceKind::Binance),
            "hyperliquid" => Ok(SourceKind::Hyperliquid),
            "coinglass" => Ok(SourceKind::Coinglass),
            other => Err(CollectorError::Config(format!("unknown source '{}'", other))),
        }
    }
}

/// Log verbosity of a recurring job runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, clap::ValueEnum)]
pub enum Verbosity {
    Minimal,
    Normal,
    Verbose,
}

impl FromStr for Verbosity {
    type Err = CollectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "minimal" => Ok(Verbosity::Minimal),
            "normal" => Ok(Verbosity::Normal),
            "verbose" => Ok(Verbosity::Verbose),
            other => Err(CollectorError::Config(format!("unknown verbosity '{}'", other))),
        }
    }
}

pub const DEFAULT_BINANCE_BASE_URL: &str = "https://fapi.binance.com";
pub const DEFAULT_HYPERLIQUID_BASE_URL: &str = "https://api.hyperliquid.xyz";
pub const DEFAULT_COINGLASS_BASE_URL: &str = "https://open-api-v4.coinglass.com";

/// Configuration for the application
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub snapshot_dir: PathBuf,
    pub history_limit: usize,
    pub update_interval: Duration,
    pub analysis_interval: Duration,
    pub retry_count: u32,
    pub retry_delay: Duration,
    pub rate_limit_per_minute: u32,
    pub top_opportunities: usize,
    pub enabled_sources: Vec<SourceKind>,
    pub binance_api_key: Option<String>,
    pub coinglass_api_key: Option<String>,
    pub binance_base_url: String,
    pub hyperliquid_base_url: String,
    pub coinglass_base_url: String,
    pub verbosity: Verbosity,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, CollectorError> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CollectorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let enabled_sources = get("ENABLED_SOURCES")
            .unwrap_or_else(|| "binance,hyperliquid".to_string())
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(SourceKind::from_str)
            .collect::<Result<Vec<_>, _>>()?;

        let config = Config {
            database_path: get("DATABASE_PATH").unwrap_or_else(|| "funding_rates.db".to_string()),
            snapshot_dir: PathBuf::from(
                get("SNAPSHOT_DIR").unwrap_or_else(|| "data/snapshots".to_string()),
            ),
            history_limit: parse_or(&get, "HISTORY_LIMIT", 1000)?,
            update_interval: Duration::from_secs(parse_or(&get, "UPDATE_INTERVAL_SECS", 300)?),
            analysis_interval: Duration::from_secs(parse_or(&get, "ANALYSIS_INTERVAL_SECS", 600)?),
            retry_count: parse_or(&get, "RETRY_COUNT", 3)?,
            retry_delay: Duration::from_secs(parse_or(&get, "RETRY_DELAY_SECS", 5)?),
            rate_limit_per_minute: parse_or(&get, "RATE_LIMIT_PER_MINUTE", 40)?,
            top_opportunities: parse_or(&get, "TOP_OPPORTUNITIES", 20)?,
            enabled_sources,
            binance_api_key: get("BINANCE_API_KEY"),
            coinglass_api_key: get("COINGLASS_API_KEY"),
            binance_base_url: get("BINANCE_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BINANCE_BASE_URL.to_string()),
            hyperliquid_base_url: get("HYPERLIQUID_BASE_URL")
                .unwrap_or_else(|| DEFAULT_HYPERLIQUID_BASE_URL.to_string()),
            coinglass_base_url: get("COINGLASS_BASE_URL")
                .unwrap_or_else(|| DEFAULT_COINGLASS_BASE_URL.to_string()),
            verbosity: match get("LOG_VERBOSITY") {
                Some(v) => v.parse()?,
                None => Verbosity::Normal,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the scheduler and clients cannot work with
    pub fn validate(&self) -> Result<(), CollectorError> {
        if self.retry_count == 0 {
            return Err(CollectorError::Config("RETRY_COUNT must be at least 1".into()));
        }
        if self.rate_limit_per_minute == 0 {
            return Err(CollectorError::Config("RATE_LIMIT_PER_MINUTE must be at least 1".into()));
        }
        if self.history_limit == 0 {
            return Err(CollectorError::Config("HISTORY_LIMIT must be at least 1".into()));
        }
        if self.update_interval.is_zero() || self.analysis_interval.is_zero() {
            return Err(CollectorError::Config("intervals must be greater than zero".into()));
        }
        if self.enabled_sources.is_empty() {
            return Err(CollectorError::Config("ENABLED_SOURCES must name at least one source".into()));
        }
        if self.enabled_sources.contains(&SourceKind::Coinglass) && self.coinglass_api_key.is_none() {
            return Err(CollectorError::Config(
                "COINGLASS_API_KEY environment variable required when coinglass is enabled".into(),
            ));
        }
        Ok(())
    }
}

fn parse_or<T, F>(get: &F, key: &str, default: T) -> Result<T, CollectorError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| CollectorError::Config(format!("{} has invalid value '{}'", key, raw))),
        None => Ok(default),
    }
}
