use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::models::{AnalysisSnapshot, FundingRate, SnapshotStatistics};

/// Builds analysis snapshots from the latest known rates
#[derive(Debug, Clone)]
pub struct AnalysisEngine {
    top_n: usize,
}

impl AnalysisEngine {
    pub fn new(top_n: usize) -> Self {
        Self { top_n }
    }

    /// Rank rates by absolute size and summarize the batch
    pub fn build_snapshot(&self, rates: &[FundingRate], timestamp: DateTime<Utc>) -> AnalysisSnapshot {
        let mut ranked: Vec<FundingRate> = rates.to_vec();
        ranked.sort_by(|a, b| {
            b.rate
                .abs()
                .partial_cmp(&a.rate.abs())
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.asset.cmp(&b.asset))
                .then_with(|| a.exchange.cmp(&b.exchange))
        });
        ranked.truncate(self.top_n);

        AnalysisSnapshot {
            timestamp,
            top_opportunities: ranked,
            statistics: Self::statistics(rates),
        }
    }

    pub fn statistics(rates: &[FundingRate]) -> SnapshotStatistics {
        if rates.is_empty() {
            return SnapshotStatistics::default();
        }

        let assets: HashSet<&str> = rates.iter().map(|r| r.asset.as_str()).collect();
        let exchanges: HashSet<&str> = rates.iter().map(|r| r.exchange.as_str()).collect();
        let sum: f64 = rates.iter().map(|r| r.rate).sum();

        SnapshotStatistics {
            total_rates: rates.len(),
            positive_rates: rates.iter().filter(|r| r.rate > 0.0).count(),
            negative_rates: rates.iter().filter(|r| r.rate < 0.0).count(),
            assets: assets.len(),
            exchanges: exchanges.len(),
            average_rate: sum / rates.len() as f64,
        }
    }
}
