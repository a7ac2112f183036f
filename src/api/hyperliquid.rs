use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde_json::{json, Value};
use tracing::debug;

use super::{FundingDataProvider, RemoteClient};
use crate::error::{CollectorError, CollectorResult};
use crate::models::{Config, RawFundingRecord, SourceKind};

/// Hyperliquid perpetuals client
///
/// Funding on Hyperliquid settles hourly; rates are stored as reported.
pub struct HyperliquidClient {
    remote: RemoteClient,
}

impl HyperliquidClient {
    pub fn new(config: &Config) -> CollectorResult<Self> {
        let remote = RemoteClient::new(
            "hyperliquid",
            &config.hyperliquid_base_url,
            config.rate_limit_per_minute,
            None,
            &[],
        )?;
        Ok(Self { remote })
    }

    pub fn from_remote(remote: RemoteClient) -> Self {
        Self { remote }
    }

    /// Pair `universe[i]` with `assetCtxs[i]`
    fn parse_meta_and_asset_ctxs(data: &Value, observed_at: DateTime<Utc>) -> CollectorResult<Vec<RawFundingRecord>> {
        let universe = data
            .get(0)
            .and_then(|meta| meta.get("universe"))
            .and_then(|u| u.as_array())
            .ok_or_else(|| CollectorError::decode("hyperliquid", "missing meta.universe"))?;
        let contexts = data
            .get(1)
            .and_then(|c| c.as_array())
            .ok_or_else(|| CollectorError::decode("hyperliquid", "missing asset contexts"))?;

        let next_funding = observed_at
            .duration_trunc(TimeDelta::hours(1))
            .ok()
            .map(|hour| hour + TimeDelta::hours(1));

        let mut records = Vec::with_capacity(universe.len());
        for (asset, ctx) in universe.iter().zip(contexts.iter()) {
            let Some(name) = asset.get("name").and_then(|v| v.as_str()) else {
                continue;
            };

            let mut record = RawFundingRecord::new(
                name,
                SourceKind::Hyperliquid.exchange_label(),
                ctx.get("funding").cloned(),
            );
            record.next_funding_time_ms = next_funding.map(|t| t.timestamp_millis());
            record.open_interest = ctx.get("openInterest").cloned();
            record.mark_price = ctx.get("markPx").cloned();
            record.volume_24h = ctx.get("dayNtlVlm").cloned();
            records.push(record);
        }

        Ok(records)
    }
}

#[async_trait::async_trait]
impl FundingDataProvider for HyperliquidClient {
    fn source(&self) -> SourceKind {
        SourceKind::Hyperliquid
    }

    async fn fetch_funding_rates(&self, observed_at: DateTime<Utc>) -> CollectorResult<Vec<RawFundingRecord>> {
        let data = self
            .remote
            .post_json("/info", &json!({ "type": "metaAndAssetCtxs" }))
            .await?;
        let records = Self::parse_meta_and_asset_ctxs(&data, observed_at)?;
        debug!("Retrieved {} asset contexts from Hyperliquid", records.len());
        Ok(records)
    }
}
