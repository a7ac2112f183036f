use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use super::{FundingDataProvider, RemoteClient};
use crate::error::{CollectorError, CollectorResult};
use crate::models::{Config, RateUnit, RawFundingRecord, SourceKind};

const EXCHANGE_LIST_PATH: &str = "/api/futures/funding-rate/exchange-list";

/// Header names the aggregator has accepted over time; the key goes out under all of them
const KEY_HEADERS: [&str; 2] = ["coinglassSecret", "CG-API-KEY"];

/// CoinGlass aggregator client; one response covers many exchanges
pub struct CoinglassClient {
    remote: RemoteClient,
}

impl CoinglassClient {
    pub fn new(config: &Config) -> CollectorResult<Self> {
        let api_key = config
            .coinglass_api_key
            .as_deref()
            .ok_or_else(|| CollectorError::Config("COINGLASS_API_KEY environment variable required".into()))?;

        let remote = RemoteClient::new(
            "coinglass",
            &config.coinglass_base_url,
            config.rate_limit_per_minute,
            Some(api_key),
            &KEY_HEADERS,
        )?;
        Ok(Self { remote })
    }

    pub fn from_remote(remote: RemoteClient) -> Self {
        Self { remote }
    }

    fn parse_exchange_list(data: &Value) -> CollectorResult<Vec<RawFundingRecord>> {
        // The API reports logical failures with HTTP 200 and a non-zero code
        let code = data.get("code").map(|c| match c {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
        if code.as_deref() != Some("0") {
            let msg = data.get("msg").and_then(|m| m.as_str()).unwrap_or("unknown error");
            warn!("coinglass: API returned code {:?}: {}", code, msg);
            return Err(CollectorError::Remote {
                status: 200,
                body: data.to_string(),
            });
        }

        let symbols = data
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| CollectorError::decode("coinglass", "missing data array"))?;

        let mut records = Vec::new();
        for entry in symbols {
            let Some(symbol) = entry.get("symbol").and_then(|v| v.as_str()) else {
                continue;
            };
            let Some(venues) = entry.get("stablecoin_margin_list").and_then(|v| v.as_array()) else {
                continue;
            };

            for venue in venues {
                let Some(exchange) = venue.get("exchange").and_then(|v| v.as_str()) else {
                    continue;
                };
                let mut record = RawFundingRecord::new(symbol, exchange, venue.get("funding_rate").cloned());
                record.rate_unit = RateUnit::Percent;
                record.next_funding_time_ms = venue.get("next_funding_time").and_then(|v| v.as_i64());
                records.push(record);
            }
        }

        Ok(records)
    }
}

#[async_trait::async_trait]
impl FundingDataProvider for CoinglassClient {
    fn source(&self) -> SourceKind {
        SourceKind::Coinglass
    }

    async fn fetch_funding_rates(&self, _observed_at: DateTime<Utc>) -> CollectorResult<Vec<RawFundingRecord>> {
        let data = self.remote.get(EXCHANGE_LIST_PATH, &[]).await?;
        let records = Self::parse_exchange_list(&data)?;
        debug!("Retrieved {} exchange funding rates from CoinGlass", records.len());
        Ok(records)
    }
}
