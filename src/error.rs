//! Error types for the collector
//!
//! Component-level failures are expressed as [`CollectorError`]. Job commands
//! return `anyhow::Result`, so any of these converts into a job-level failure
//! that the orchestrator retries.

use thiserror::Error;

/// Coarse classification used when deciding how a failure is recovered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Non-2xx responses and network failures; retried by the job policy
    Transport,
    /// Malformed or missing fields; the offending record is skipped
    Validation,
    /// Upsert or file-write failures; retried by the job policy
    Persistence,
    /// Startup configuration problems; fatal
    Configuration,
}

#[derive(Debug, Error)]
pub enum CollectorError {
    /// The remote source answered with a non-2xx status
    #[error("remote request failed with status {status}: {body}")]
    Remote { status: u16, body: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("failed to decode response from {source_name}: {message}")]
    Decode { source_name: String, message: String },

    #[error("invalid record from {exchange}: {message}")]
    Validation { exchange: String, message: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("snapshot storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl CollectorError {
    pub fn validation(exchange: &str, message: impl Into<String>) -> Self {
        CollectorError::Validation {
            exchange: exchange.to_string(),
            message: message.into(),
        }
    }

    pub fn decode(source_name: &str, message: impl Into<String>) -> Self {
        CollectorError::Decode {
            source_name: source_name.to_string(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CollectorError::Remote { .. }
            | CollectorError::Network(_)
            | CollectorError::Decode { .. } => ErrorKind::Transport,
            CollectorError::Validation { .. } => ErrorKind::Validation,
            CollectorError::Database(_) | CollectorError::Io(_) | CollectorError::Json(_) => {
                ErrorKind::Persistence
            }
            CollectorError::Config(_) => ErrorKind::Configuration,
        }
    }

    /// HTTP status of a remote failure, if this is one
    pub fn status(&self) -> Option<u16> {
        match self {
            CollectorError::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Registry errors raised by the orchestrator
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("job '{0}' is already registered")]
    DuplicateJob(String),

    #[error("registering '{job}' would create a dependency cycle: {}", path.join(" -> "))]
    DependencyCycle { job: String, path: Vec<String> },

    #[error("unknown job '{0}'")]
    UnknownJob(String),

    #[error("job '{job}' is invalid: {reason}")]
    InvalidJob { job: String, reason: String },
}

pub type CollectorResult<T> = std::result::Result<T, CollectorError>;
