//! Wires the daemon's jobs from configuration
//!
//! One `<source>-rates` job per enabled source writes to the SQLite store.
//! `analysis-snapshot` depends on all of them and writes the snapshot history.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::analysis::AnalysisEngine;
use crate::api::provider_for;
use crate::collector::{AnalysisTask, CollectionTask};
use crate::database::RateStore;
use crate::models::Config;
use crate::retention::SnapshotStore;
use crate::scheduler::{JobCommand, JobDefinition, Orchestrator};
use crate::sink::{ResultSink, SnapshotSink};

pub const ANALYSIS_JOB: &str = "analysis-snapshot";

/// Job definitions for every enabled source plus the analysis job
pub fn build_jobs(config: &Config, store: RateStore, snapshots: Arc<SnapshotStore>) -> Result<Vec<JobDefinition>> {
    let mut jobs = Vec::with_capacity(config.enabled_sources.len() + 1);
    let store_sink: Arc<dyn ResultSink> = Arc::new(store.clone());

    for &source in &config.enabled_sources {
        let provider = provider_for(source, config).with_context(|| format!("creating {} client", source))?;
        let task = CollectionTask::new(provider, vec![store_sink.clone()]);

        jobs.push(
            JobDefinition::new(&source.job_name(), JobCommand::Collect(Arc::new(task)), config.update_interval)
                .with_retry(config.retry_count, config.retry_delay),
        );
    }

    let snapshot_sink: Arc<dyn ResultSink> = Arc::new(SnapshotSink::new(
        snapshots,
        AnalysisEngine::new(config.top_opportunities),
    ));
    let analysis = AnalysisTask::new(store, snapshot_sink);
    jobs.push(
        JobDefinition::new(ANALYSIS_JOB, JobCommand::Analyze(Arc::new(analysis)), config.analysis_interval)
            .with_retry(config.retry_count, config.retry_delay)
            .depends_on(config.enabled_sources.iter().map(|s| s.job_name())),
    );

    Ok(jobs)
}

pub fn register_jobs(orchestrator: &mut Orchestrator, jobs: Vec<JobDefinition>) -> Result<()> {
    for job in jobs {
        orchestrator.register(job)?;
    }
    Ok(())
}
