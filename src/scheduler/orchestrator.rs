//! Registry of named jobs driven by a fixed-cadence tick loop
//!
//! Jobs run one after another within a tick. A job whose dependencies have
//! not succeeded within twice their own interval is skipped for that tick.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::clock::Clock;
use super::job::{JobContext, JobDefinition, JobStatus};
use super::status::render_status;
use crate::error::SchedulerError;

#[derive(Clone)]
pub struct OrchestratorOptions {
    pub tick_resolution: Duration,
    /// Print the status table to stdout whenever it changes
    pub print_status: bool,
    pub clock: Clock,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            tick_resolution: Duration::from_secs(1),
            print_status: false,
            clock: Clock::system(),
        }
    }
}

/// What happened during one tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    pub skipped: Vec<String>,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        self.succeeded.is_empty() && self.failed.is_empty() && self.skipped.is_empty()
    }
}

pub struct Orchestrator {
    jobs: Vec<JobDefinition>,
    statuses: HashMap<String, JobStatus>,
    options: OrchestratorOptions,
    last_rendered: Option<String>,
    /// Set while `run` is active; a true value stops retries and pending jobs
    shutdown: Option<watch::Receiver<bool>>,
}

impl Orchestrator {
    pub fn new(options: OrchestratorOptions) -> Self {
        Self {
            jobs: Vec::new(),
            statuses: HashMap::new(),
            options,
            last_rendered: None,
            shutdown: None,
        }
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Add a job; names are unique and the dependency graph stays acyclic
    ///
    /// Dependencies on names not registered yet are accepted. Until such a
    /// job exists the dependent never becomes eligible.
    pub fn register(&mut self, definition: JobDefinition) -> Result<(), SchedulerError> {
        if definition.retry_count == 0 {
            return Err(SchedulerError::InvalidJob {
                job: definition.name,
                reason: "retry count must be at least 1".into(),
            });
        }
        if definition.interval.is_zero() {
            return Err(SchedulerError::InvalidJob {
                job: definition.name,
                reason: "interval must be positive".into(),
            });
        }
        if self.job(&definition.name).is_some() {
            return Err(SchedulerError::DuplicateJob(definition.name));
        }
        if let Some(path) = self.find_cycle(&definition) {
            return Err(SchedulerError::DependencyCycle {
                job: definition.name,
                path,
            });
        }

        for dep in &definition.dependencies {
            if self.job(dep).is_none() {
                warn!("Job '{}' depends on '{}', which is not registered yet", definition.name, dep);
            }
        }

        info!(
            "📋 Registered job '{}' (every {}s, {} attempts)",
            definition.name,
            definition.interval.as_secs(),
            definition.retry_count
        );
        self.statuses.insert(definition.name.clone(), JobStatus::default());
        self.jobs.push(definition);
        Ok(())
    }

    fn find_cycle(&self, definition: &JobDefinition) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        for dep in &definition.dependencies {
            let mut path = vec![definition.name.clone(), dep.clone()];
            if self.reaches(dep, &definition.name, &mut path, &mut visited) {
                return Some(path);
            }
        }
        None
    }

    fn reaches<'a>(
        &'a self,
        from: &'a str,
        target: &str,
        path: &mut Vec<String>,
        visited: &mut HashSet<&'a str>,
    ) -> bool {
        if from == target {
            return true;
        }
        if !visited.insert(from) {
            return false;
        }
        let Some(job) = self.job(from) else {
            return false;
        };
        for dep in &job.dependencies {
            path.push(dep.clone());
            if self.reaches(dep, target, path, visited) {
                return true;
            }
            path.pop();
        }
        false
    }

    pub fn job(&self, name: &str) -> Option<&JobDefinition> {
        self.jobs.iter().find(|j| j.name == name)
    }

    /// Registered jobs in registration order
    pub fn jobs(&self) -> &[JobDefinition] {
        &self.jobs
    }

    pub fn status(&self, name: &str) -> Option<&JobStatus> {
        self.statuses.get(name)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.options.clock.now()
    }

    /// Dependencies of `name` that are missing, never succeeded, or stale at `now`
    pub fn unmet_dependencies(&self, name: &str, now: DateTime<Utc>) -> Vec<String> {
        let Some(job) = self.job(name) else {
            return Vec::new();
        };

        job.dependencies
            .iter()
            .filter(|dep| !self.is_fresh(dep, now))
            .cloned()
            .collect()
    }

    pub fn dependencies_met(&self, name: &str, now: DateTime<Utc>) -> bool {
        self.unmet_dependencies(name, now).is_empty()
    }

    fn is_fresh(&self, name: &str, now: DateTime<Utc>) -> bool {
        let (Some(job), Some(status)) = (self.job(name), self.statuses.get(name)) else {
            return false;
        };
        let Some(last_success) = status.last_success_at else {
            return false;
        };
        match (now - last_success).to_std() {
            Ok(age) => age <= job.interval.saturating_mul(2),
            // A success stamped after `now` is as fresh as it gets
            Err(_) => true,
        }
    }

    /// Whether the job's interval has elapsed since it was last attempted
    pub fn is_due(&self, name: &str, now: DateTime<Utc>) -> bool {
        let (Some(job), Some(status)) = (self.job(name), self.statuses.get(name)) else {
            return false;
        };
        match status.last_run_at {
            None => true,
            Some(last_run) => (now - last_run)
                .to_std()
                .map(|elapsed| elapsed >= job.interval)
                .unwrap_or(false),
        }
    }

    /// Run one job with its retry policy, bypassing the interval check
    ///
    /// Returns whether an attempt succeeded. Once shutdown is requested no
    /// further attempt is started and a pending retry delay is cut short.
    pub async fn execute_job(&mut self, name: &str, scheduled_at: DateTime<Utc>) -> Result<bool, SchedulerError> {
        let job = self
            .job(name)
            .cloned()
            .ok_or_else(|| SchedulerError::UnknownJob(name.to_string()))?;

        let mut attempts = 0;
        for attempt in 1..=job.retry_count {
            if attempt > 1 && self.shutdown_requested() {
                break;
            }
            attempts = attempt;
            let ctx = JobContext {
                job: job.name.clone(),
                scheduled_at,
                attempt,
            };

            match job.command.execute(&ctx).await {
                Ok(()) => {
                    let finished_at = self.now();
                    let status = self.statuses.entry(job.name.clone()).or_default();
                    status.consecutive_error_count = 0;
                    status.last_success_at = Some(finished_at);
                    status.last_error = None;
                    if attempt > 1 {
                        info!("✅ Job '{}' succeeded on attempt {}/{}", job.name, attempt, job.retry_count);
                    } else {
                        debug!("Job '{}' succeeded", job.name);
                    }
                    return Ok(true);
                }
                Err(e) => {
                    let status = self.statuses.entry(job.name.clone()).or_default();
                    status.consecutive_error_count += 1;
                    status.last_error = Some(format!("{:#}", e));
                    warn!(
                        "⚠️ Job '{}' attempt {}/{} failed: {:#}",
                        job.name, attempt, job.retry_count, e
                    );

                    if attempt < job.retry_count
                        && !job.retry_delay.is_zero()
                        && !retry_pause(self.shutdown.clone(), job.retry_delay).await
                    {
                        break;
                    }
                }
            }
        }

        if attempts < job.retry_count {
            info!("🛑 Job '{}' retries abandoned on shutdown after {} attempts", job.name, attempts);
        } else {
            error!("❌ Job '{}' failed after {} attempts", job.name, job.retry_count);
        }
        Ok(false)
    }

    /// One evaluation pass over every registered job
    pub async fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        let names: Vec<String> = self.jobs.iter().map(|j| j.name.clone()).collect();

        for name in names {
            if self.shutdown_requested() {
                debug!("Shutdown requested, leaving remaining jobs for this tick");
                break;
            }
            let now = self.now();
            if !self.is_due(&name, now) {
                continue;
            }
            if let Some(status) = self.statuses.get_mut(&name) {
                status.last_run_at = Some(now);
            }

            let unmet = self.unmet_dependencies(&name, now);
            if !unmet.is_empty() {
                info!("⏸️ Job '{}' skipped: dependencies not met ({})", name, unmet.join(", "));
                report.skipped.push(name);
                continue;
            }

            match self.execute_job(&name, now).await {
                Ok(true) => report.succeeded.push(name),
                Ok(false) => report.failed.push(name),
                Err(e) => {
                    error!("❌ {}", e);
                    report.failed.push(name);
                }
            }
        }

        report
    }

    pub fn render_status(&self, now: DateTime<Utc>) -> String {
        render_status(&self.jobs, &self.statuses, now)
    }

    fn publish_status(&mut self) {
        let rendered = self.render_status(self.now());
        if self.last_rendered.as_deref() == Some(rendered.as_str()) {
            return;
        }
        if self.options.print_status {
            println!("{}", rendered);
        } else {
            debug!("Job status:\n{}", rendered);
        }
        self.last_rendered = Some(rendered);
    }

    /// Tick until the shutdown flag flips to true
    ///
    /// The request in flight when the flag flips finishes; retry delays are
    /// cut short and no further attempt or job is started.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        self.shutdown = Some(shutdown.clone());
        info!(
            "🔄 Orchestrator started with {} jobs, tick every {}ms",
            self.jobs.len(),
            self.options.tick_resolution.as_millis()
        );

        let mut ticker = time::interval(self.options.tick_resolution);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let report = self.tick().await;
            if !report.is_idle() {
                debug!(
                    "Tick: {} succeeded, {} failed, {} skipped",
                    report.succeeded.len(),
                    report.failed.len(),
                    report.skipped.len()
                );
            }
            self.publish_status();
        }

        self.shutdown = None;
        info!("🛑 Orchestrator stopped");
    }
}

/// Sleep for `delay` unless shutdown arrives first; false means stop retrying
async fn retry_pause(shutdown: Option<watch::Receiver<bool>>, delay: Duration) -> bool {
    let Some(mut shutdown) = shutdown else {
        time::sleep(delay).await;
        return true;
    };
    if *shutdown.borrow() {
        return false;
    }

    let sleep = time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return false;
                }
            }
        }
    }
}
