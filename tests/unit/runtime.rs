//! Recurring runtime driving a real collection task

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use funding_collector::api::FundingDataProvider;
use funding_collector::collector::CollectionTask;
use funding_collector::error::{CollectorError, CollectorResult};
use funding_collector::models::{FundingRate, RawFundingRecord, SourceKind, Verbosity};
use funding_collector::scheduler::{JobCommand, RecurringJob, RuntimeState};
use funding_collector::sink::ResultSink;

/// Returns one record per call; every second call fails
struct AlternatingProvider {
    calls: AtomicUsize,
}

#[async_trait]
impl FundingDataProvider for AlternatingProvider {
    fn source(&self) -> SourceKind {
        SourceKind::Hyperliquid
    }

    async fn fetch_funding_rates(&self, _observed_at: DateTime<Utc>) -> CollectorResult<Vec<RawFundingRecord>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call % 2 == 1 {
            return Err(CollectorError::Remote {
                status: 503,
                body: "maintenance".into(),
            });
        }
        Ok(vec![RawFundingRecord::new("BTC", "Hyperliquid", Some(json!("0.0000125")))])
    }
}

#[derive(Default)]
struct RecordingSink {
    batches: Mutex<Vec<Vec<FundingRate>>>,
}

#[async_trait]
impl ResultSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn persist(&self, rates: &[FundingRate]) -> CollectorResult<usize> {
        self.batches.lock().unwrap().push(rates.to_vec());
        Ok(rates.len())
    }
}

#[tokio::test(start_paused = true)]
async fn test_loop_survives_failed_cycles() {
    let sink = Arc::new(RecordingSink::default());
    let provider = Box::new(AlternatingProvider { calls: AtomicUsize::new(0) });
    let task = CollectionTask::new(provider, vec![sink.clone() as Arc<dyn ResultSink>]);

    let mut job = RecurringJob::new(
        "hyperliquid-snapshots",
        JobCommand::Collect(Arc::new(task)),
        Duration::from_secs(30),
        Verbosity::Verbose,
    );

    assert!(job.start().await);
    // Immediate run plus ticks at 30, 60, 90: calls 0 and 2 succeed
    tokio::time::sleep(Duration::from_secs(95)).await;
    job.stop().await;

    let batches = sink.batches.lock().unwrap();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0][0].asset, "BTC");
    assert_eq!(job.state(), RuntimeState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_stop_disarms_timer() {
    let sink = Arc::new(RecordingSink::default());
    let provider = Box::new(AlternatingProvider { calls: AtomicUsize::new(0) });
    let task = CollectionTask::new(provider, vec![sink.clone() as Arc<dyn ResultSink>]);

    let mut job = RecurringJob::new(
        "poller",
        JobCommand::Collect(Arc::new(task)),
        Duration::from_secs(10),
        Verbosity::Minimal,
    );
    assert_eq!(job.state(), RuntimeState::Idle);

    job.start().await;
    job.stop().await;
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(sink.batches.lock().unwrap().len(), 1);
}
