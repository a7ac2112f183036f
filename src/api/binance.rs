use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use super::{FundingDataProvider, RemoteClient};
use crate::error::{CollectorError, CollectorResult};
use crate::models::{Config, RawFundingRecord, SourceKind};

const PREMIUM_INDEX_PATH: &str = "/fapi/v1/premiumIndex";

/// Binance USD-M futures client
pub struct BinanceClient {
    remote: RemoteClient,
}

impl BinanceClient {
    pub fn new(config: &Config) -> CollectorResult<Self> {
        let remote = RemoteClient::new(
            "binance",
            &config.binance_base_url,
            config.rate_limit_per_minute,
            config.binance_api_key.as_deref(),
            &["X-MBX-APIKEY"],
        )?;
        Ok(Self { remote })
    }

    pub fn from_remote(remote: RemoteClient) -> Self {
        Self { remote }
    }

    fn parse_premium_index(data: &Value) -> CollectorResult<Vec<RawFundingRecord>> {
        let entries = data
            .as_array()
            .ok_or_else(|| CollectorError::decode("binance", "premiumIndex response is not an array"))?;

        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(symbol) = entry.get("symbol").and_then(|v| v.as_str()) else {
                debug!("Skipping premiumIndex entry without symbol");
                continue;
            };

            let mut record = RawFundingRecord::new(
                symbol,
                SourceKind::Binance.exchange_label(),
                entry.get("lastFundingRate").cloned(),
            );
            record.timestamp_ms = entry.get("time").and_then(|v| v.as_i64());
            record.next_funding_time_ms = entry.get("nextFundingTime").and_then(|v| v.as_i64());
            record.mark_price = entry.get("markPrice").cloned();
            records.push(record);
        }

        Ok(records)
    }
}

#[async_trait::async_trait]
impl FundingDataProvider for BinanceClient {
    fn source(&self) -> SourceKind {
        SourceKind::Binance
    }

    async fn fetch_funding_rates(&self, _observed_at: DateTime<Utc>) -> CollectorResult<Vec<RawFundingRecord>> {
        let data = self.remote.get(PREMIUM_INDEX_PATH, &[]).await?;
        let records = Self::parse_premium_index(&data)?;
        debug!("Retrieved {} premiumIndex entries from Binance", records.len());
        Ok(records)
    }
}
