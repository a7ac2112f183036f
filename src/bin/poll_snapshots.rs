//! Single-source snapshot poller
//!
//! Polls one exchange on a fixed interval and writes every batch straight into
//! the snapshot history, without touching the SQLite store.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;

use funding_collector::analysis::AnalysisEngine;
use funding_collector::api::provider_for;
use funding_collector::collector::CollectionTask;
use funding_collector::models::{Config, SourceKind, Verbosity};
use funding_collector::retention::{RetentionPolicy, SnapshotStore};
use funding_collector::scheduler::{JobCommand, RecurringJob};
use funding_collector::sink::{ResultSink, SnapshotSink};
use funding_collector::utils::{init_logging, shutdown_signal};

#[derive(Parser)]
#[command(name = "poll_snapshots", about = "📸 Poll one exchange into the snapshot history")]
struct Cli {
    /// Exchange to poll
    #[arg(value_enum)]
    source: SourceKind,

    /// Seconds between polls (defaults to UPDATE_INTERVAL_SECS)
    #[arg(long, short)]
    interval: Option<u64>,

    /// Runtime log level (defaults to LOG_VERBOSITY)
    #[arg(long, value_enum)]
    verbosity: Option<Verbosity>,

    /// Debug-level logging
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::from_env()?;
    let interval = cli.interval.map(Duration::from_secs).unwrap_or(config.update_interval);
    let verbosity = cli.verbosity.unwrap_or(config.verbosity);

    let store = Arc::new(SnapshotStore::new(
        config.snapshot_dir.clone(),
        RetentionPolicy {
            max_history_items: config.history_limit,
        },
    ));
    let sink: Arc<dyn ResultSink> = Arc::new(SnapshotSink::new(store, AnalysisEngine::new(config.top_opportunities)));
    let task = CollectionTask::new(provider_for(cli.source, &config)?, vec![sink]);

    println!("📸 Polling {} every {}s into {}", cli.source, interval.as_secs(), config.snapshot_dir.display());

    let mut job = RecurringJob::new(
        &format!("{}-snapshots", cli.source),
        JobCommand::Collect(Arc::new(task)),
        interval,
        verbosity,
    );
    job.start().await;

    shutdown_signal().await;
    job.stop().await;
    Ok(())
}
