use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use crate::analysis::AnalysisEngine;
use crate::database::RateStore;
use crate::error::CollectorResult;
use crate::models::FundingRate;
use crate::retention::SnapshotStore;

/// Somewhere a batch of normalized rates ends up
///
/// The SQLite store and the snapshot history are interchangeable here, so
/// collection and analysis jobs do not care which one they write to.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ResultSink: Send + Sync {
    fn name(&self) -> &str;

    /// Persist the whole batch or fail as a unit; returns the number of
    /// records written
    async fn persist(&self, rates: &[FundingRate]) -> CollectorResult<usize>;
}

#[async_trait::async_trait]
impl ResultSink for RateStore {
    fn name(&self) -> &str {
        "rate-store"
    }

    async fn persist(&self, rates: &[FundingRate]) -> CollectorResult<usize> {
        self.upsert_rates(rates).await
    }
}

/// Turns each batch into an analysis snapshot on disk
pub struct SnapshotSink {
    store: Arc<SnapshotStore>,
    engine: AnalysisEngine,
}

impl SnapshotSink {
    pub fn new(store: Arc<SnapshotStore>, engine: AnalysisEngine) -> Self {
        Self { store, engine }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }
}

#[async_trait::async_trait]
impl ResultSink for SnapshotSink {
    fn name(&self) -> &str {
        "snapshots"
    }

    async fn persist(&self, rates: &[FundingRate]) -> CollectorResult<usize> {
        let snapshot = self.engine.build_snapshot(rates, Utc::now());
        let entry = self.store.save(&snapshot).await?;
        info!(
            "📸 Snapshot {} saved: {} rates, {} top opportunities",
            entry.id,
            snapshot.statistics.total_rates,
            snapshot.top_opportunities.len()
        );
        Ok(1)
    }
}
