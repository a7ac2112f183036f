//! One collection or analysis cycle
//!
//! A cycle fetches from one provider, normalizes the batch and hands it to
//! every configured sink. Any failure is returned to the caller, which owns
//! the retry policy.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::api::FundingDataProvider;
use crate::database::RateStore;
use crate::models::SourceKind;
use crate::normalize::normalize_batch;
use crate::sink::ResultSink;

/// Counters for one completed cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionReport {
    pub fetched: usize,
    pub normalized: usize,
    pub skipped: usize,
    pub written: usize,
}

/// Poll one source and write the normalized batch through the sinks
pub struct CollectionTask {
    provider: Box<dyn FundingDataProvider>,
    sinks: Vec<Arc<dyn ResultSink>>,
}

impl CollectionTask {
    pub fn new(provider: Box<dyn FundingDataProvider>, sinks: Vec<Arc<dyn ResultSink>>) -> Self {
        Self { provider, sinks }
    }

    pub fn source(&self) -> SourceKind {
        self.provider.source()
    }

    pub async fn run(&self, scheduled_at: DateTime<Utc>) -> Result<CollectionReport> {
        let source = self.provider.source();

        let raw = self
            .provider
            .fetch_funding_rates(scheduled_at)
            .await
            .map_err(|e| {
                error!("❌ {}: fetch failed - {}", source, e);
                e
            })
            .with_context(|| format!("fetching funding rates from {}", source))?;

        let rates = normalize_batch(&raw, scheduled_at);
        let mut report = CollectionReport {
            fetched: raw.len(),
            normalized: rates.len(),
            skipped: raw.len() - rates.len(),
            written: 0,
        };

        if rates.is_empty() {
            warn!("⚠️ {}: no usable records in this cycle", source);
            return Ok(report);
        }

        for sink in &self.sinks {
            let written = sink
                .persist(&rates)
                .await
                .map_err(|e| {
                    error!("❌ {}: {} write failed - {}", source, sink.name(), e);
                    e
                })
                .with_context(|| format!("writing {} rates to {}", source, sink.name()))?;
            report.written += written;
        }

        info!(
            "✅ {}: {} records fetched, {} normalized, {} skipped",
            source, report.fetched, report.normalized, report.skipped
        );
        Ok(report)
    }
}

/// Summarize the newest stored rate of every pair into the snapshot history
pub struct AnalysisTask {
    store: RateStore,
    sink: Arc<dyn ResultSink>,
}

impl AnalysisTask {
    pub fn new(store: RateStore, sink: Arc<dyn ResultSink>) -> Self {
        Self { store, sink }
    }

    pub async fn run(&self) -> Result<usize> {
        let rates = self
            .store
            .latest_per_pair()
            .await
            .context("reading latest rates for analysis")?;

        if rates.is_empty() {
            warn!("⚠️ No stored rates yet, skipping analysis");
            return Ok(0);
        }

        let written = self
            .sink
            .persist(&rates)
            .await
            .with_context(|| format!("writing analysis to {}", self.sink.name()))?;
        info!("📊 Analysis cycle covered {} asset/exchange pairs", rates.len());
        Ok(written)
    }
}
