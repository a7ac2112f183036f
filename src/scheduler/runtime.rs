//! Interval-driven loop around one unit of work
//!
//! `start` runs the work once right away, then again every interval until
//! `stop`. A failing cycle is logged and the loop keeps going.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{error, info};

use super::job::{JobCommand, JobContext};
use crate::models::Verbosity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    Idle,
    Running,
    Stopped,
}

/// Level-gated logger shared between the handle and its spawned loop
#[derive(Debug, Clone)]
pub struct JobLogger {
    name: Arc<str>,
    verbosity: Verbosity,
}

impl JobLogger {
    pub fn new(name: &str, verbosity: Verbosity) -> Self {
        Self {
            name: Arc::from(name),
            verbosity,
        }
    }

    pub fn enabled(&self, level: Verbosity) -> bool {
        level <= self.verbosity
    }

    pub fn log(&self, level: Verbosity, message: &str) {
        if self.enabled(level) {
            info!("[{}] {}", self.name, message);
        }
    }

    pub fn failure(&self, message: &str) {
        error!("[{}] {}", self.name, message);
    }
}

pub struct RecurringJob {
    name: String,
    command: JobCommand,
    interval: Duration,
    logger: JobLogger,
    state: RuntimeState,
    shutdown: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl RecurringJob {
    pub fn new(name: &str, command: JobCommand, interval: Duration, verbosity: Verbosity) -> Self {
        Self {
            name: name.to_string(),
            command,
            interval,
            logger: JobLogger::new(name, verbosity),
            state: RuntimeState::Idle,
            shutdown: None,
            handle: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> RuntimeState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == RuntimeState::Running
    }

    /// Run once now, then arm the repeating timer
    ///
    /// Returns false without doing anything if the job is already running.
    pub async fn start(&mut self) -> bool {
        if self.is_running() {
            self.logger.log(Verbosity::Verbose, "already running, start ignored");
            return false;
        }

        self.state = RuntimeState::Running;
        self.logger.log(
            Verbosity::Normal,
            &format!("🚀 starting, interval {}s", self.interval.as_secs()),
        );

        run_cycle(&self.name, &self.command, &self.logger).await;

        let (tx, mut rx) = watch::channel(false);
        let name = self.name.clone();
        let command = self.command.clone();
        let logger = self.logger.clone();
        let interval = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        run_cycle(&name, &command, &logger).await;
                    }
                    _ = rx.changed() => break,
                }
            }
        });

        self.shutdown = Some(tx);
        self.handle = Some(handle);
        true
    }

    /// Disarm the timer and wait for an in-flight cycle to finish
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                self.logger.failure(&format!("loop ended abnormally: {}", e));
            }
        }
        if self.state == RuntimeState::Running {
            self.logger.log(Verbosity::Normal, "🛑 stopped");
        }
        self.state = RuntimeState::Stopped;
    }

    /// One cycle outside the timer; true on success
    pub async fn run_once(&self) -> bool {
        run_cycle(&self.name, &self.command, &self.logger).await
    }
}

async fn run_cycle(name: &str, command: &JobCommand, logger: &JobLogger) -> bool {
    let ctx = JobContext {
        job: name.to_string(),
        scheduled_at: Utc::now(),
        attempt: 1,
    };
    logger.log(Verbosity::Verbose, "cycle started");
    let started = Instant::now();

    match command.execute(&ctx).await {
        Ok(()) => {
            logger.log(
                Verbosity::Normal,
                &format!("✅ cycle finished in {:.2}s", started.elapsed().as_secs_f64()),
            );
            true
        }
        Err(e) => {
            // Minimal level: always printed
            logger.failure(&format!("❌ cycle failed: {:#}", e));
            false
        }
    }
}
