use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::collector::{AnalysisTask, CollectionTask};

/// What a command gets to know about the attempt it is running
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobContext {
    pub job: String,
    /// Instant the tick was scheduled; identical for every retry of one tick
    pub scheduled_at: DateTime<Utc>,
    pub attempt: u32,
}

pub type JobFn = Arc<dyn Fn(JobContext) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// The unit of work a job runs
#[derive(Clone)]
pub enum JobCommand {
    /// Poll a source and write through its sinks
    Collect(Arc<CollectionTask>),
    /// Build a snapshot from the stored rates
    Analyze(Arc<AnalysisTask>),
    /// Anything else
    Callback(JobFn),
}

impl JobCommand {
    pub fn callback<F, Fut>(f: F) -> Self
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        JobCommand::Callback(Arc::new(move |ctx| -> BoxFuture<'static, Result<()>> { Box::pin(f(ctx)) }))
    }

    pub async fn execute(&self, ctx: &JobContext) -> Result<()> {
        match self {
            JobCommand::Collect(task) => task.run(ctx.scheduled_at).await.map(|_| ()),
            JobCommand::Analyze(task) => task.run().await.map(|_| ()),
            JobCommand::Callback(f) => f(ctx.clone()).await,
        }
    }
}

impl fmt::Debug for JobCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobCommand::Collect(task) => write!(f, "Collect({})", task.source()),
            JobCommand::Analyze(_) => f.write_str("Analyze"),
            JobCommand::Callback(_) => f.write_str("Callback"),
        }
    }
}

/// A named, independently scheduled unit of recurring work
#[derive(Debug, Clone)]
pub struct JobDefinition {
    pub name: String,
    pub command: JobCommand,
    pub interval: Duration,
    pub retry_count: u32,
    pub retry_delay: Duration,
    pub dependencies: Vec<String>,
}

impl JobDefinition {
    /// A job that runs once per tick with no retries and no dependencies
    pub fn new(name: &str, command: JobCommand, interval: Duration) -> Self {
        Self {
            name: name.to_string(),
            command,
            interval,
            retry_count: 1,
            retry_delay: Duration::ZERO,
            dependencies: Vec::new(),
        }
    }

    pub fn with_retry(mut self, retry_count: u32, retry_delay: Duration) -> Self {
        self.retry_count = retry_count;
        self.retry_delay = retry_delay;
        self
    }

    pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }
}

/// Runtime bookkeeping for one job, owned by the orchestrator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobStatus {
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub consecutive_error_count: u32,
    pub last_error: Option<String>,
}
