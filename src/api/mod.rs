use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::error::CollectorResult;
use crate::models::{Config, RawFundingRecord, SourceKind};

pub mod binance;
pub mod coinglass;
pub mod hyperliquid;
pub mod remote_client;

pub use binance::BinanceClient;
pub use coinglass::CoinglassClient;
pub use hyperliquid::HyperliquidClient;
pub use remote_client::{QueryValue, RemoteClient};

/// Minimum-spacing rate limiter for one remote source
///
/// Requests are serialized through the limiter; the spacing is measured from
/// the moment the previous request finished, so the gap between two request
/// starts is never shorter than `60_000 / requests_per_minute` ms.
pub struct ApiRateLimiter {
    min_spacing: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl ApiRateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        let delay_ms = if requests_per_minute > 0 {
            60_000 / requests_per_minute as u64
        } else {
            1000 // Default 1 second delay
        };

        Self {
            min_spacing: Duration::from_millis(delay_ms),
            last_request: Mutex::new(None),
        }
    }

    pub fn min_spacing(&self) -> Duration {
        self.min_spacing
    }

    /// Run `request` once the spacing since the previous request has elapsed
    pub async fn run<F, T>(&self, request: F) -> T
    where
        F: Future<Output = T>,
    {
        let mut last = self.last_request.lock().await;

        if let Some(finished_at) = *last {
            let elapsed = finished_at.elapsed();
            if elapsed < self.min_spacing {
                let wait = self.min_spacing - elapsed;
                debug!("Rate limiter waiting {}ms", wait.as_millis());
                tokio::time::sleep(wait).await;
            }
        }

        let output = request.await;
        // Recorded after the round trip, whether it succeeded or not
        *last = Some(Instant::now());
        output
    }
}

/// A source of funding rate records
#[async_trait::async_trait]
pub trait FundingDataProvider: Send + Sync {
    fn source(&self) -> SourceKind;

    /// Fetch one batch of raw records; `observed_at` stamps records that
    /// carry no timestamp of their own
    async fn fetch_funding_rates(&self, observed_at: DateTime<Utc>) -> CollectorResult<Vec<RawFundingRecord>>;
}

/// Build the provider for a configured source
pub fn provider_for(source: SourceKind, config: &Config) -> CollectorResult<Box<dyn FundingDataProvider>> {
    Ok(match source {
        SourceKind::Binance => Box::new(BinanceClient::new(config)?),
        SourceKind::Hyperliquid => Box::new(HyperliquidClient::new(config)?),
        SourceKind::Coinglass => Box::new(CoinglassClient::new(config)?),
    })
}
