//! Error types for the media pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level application errors.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration loading and parsing errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {message}")]
    ParseFailed { path: PathBuf, message: String },

    #[error("Config validation failed with {error_count} error(s)")]
    ValidationFailed { error_count: usize },
}

/// Queue and orchestration errors.
///
/// Per-job failures are never surfaced through this enum; they are recorded
/// on the job itself. Only caller misconfiguration is escalated.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Job has no executable configured")]
    MissingExecutable,

    #[error("Job not found: {job_id}")]
    JobNotFound { job_id: String },

    #[error("Failed to parse job manifest '{path}': {message}")]
    ManifestFailed { path: PathBuf, message: String },
}

/// Capability lookup errors.
///
/// Probe failures never surface here; the scanner degrades them to
/// "unavailable". Only a caller naming an encoder that does not exist in the
/// catalog is an error.
#[derive(Error, Debug)]
pub enum CapabilityError {
    #[error("Unknown encoder '{name}'. Did you mean '{suggestion}'?")]
    UnknownEncoder { name: String, suggestion: String },
}
