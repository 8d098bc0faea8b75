//! Typed errors for the job discovery pipeline.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so callers can match
//! on the failure taxonomy: per-record, per-source and per-batch failures are
//! recovered inside a run, everything else surfaces to the caller.

use std::time::Duration;

use thiserror::Error;

use crate::types::job::{JobId, JobStatus};

/// Errors that can occur while running or configuring the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A source adapter did not answer within its time budget
    #[error("source {source_name} timed out after {budget:?}")]
    AdapterTimeout { source_name: String, budget: Duration },

    /// A source adapter returned an error (not a timeout)
    #[error("source {source_name} failed: {reason}")]
    AdapterFailure { source_name: String, reason: String },

    /// One raw record could not be normalized
    #[error(transparent)]
    MalformedRecord(#[from] MalformedRecord),

    /// A persistence batch still failed after all retries
    #[error("persistence batch of {job_count} jobs failed after {attempts} attempts: {reason}")]
    PersistenceBatchFailure {
        job_count: usize,
        attempts: u32,
        reason: String,
    },

    /// No source adapter produced a batch
    #[error("no sources succeeded")]
    NoSourcesSucceeded,

    /// Storage operation failed
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Batch exceeds what the store accepts in one write
    #[error("batch of {size} exceeds maximum of {max}")]
    BatchTooLarge { size: usize, max: usize },

    /// Lifecycle status cannot move this way
    #[error("invalid status transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    /// Job not present in the store
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl PipelineError {
    /// Wrap any error as a storage failure.
    pub fn storage(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Storage(err.into())
    }
}

/// Why a raw record was rejected by the normalizer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedRecord {
    /// A required field is absent or blank
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    /// Posted date did not match any accepted form
    #[error("unparsable date: {value}")]
    UnparsableDate { value: String },

    /// Salary text or currency could not be interpreted
    #[error("unparsable salary: {value}")]
    UnparsableSalary { value: String },

    /// Application link is not an absolute http(s) URL
    #[error("unresolvable application link: {value}")]
    InvalidLink { value: String },

    /// Record is not a JSON object
    #[error("record is not an object")]
    NotAnObject,
}

/// Errors returned by source adapters.
#[derive(Debug, Error)]
pub enum SourceError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Remote API answered with a non-success status
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Reading a local batch failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload was not a JSON array of records
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Source config lacks an option this adapter needs
    #[error("missing option `{option}` for source {source_name}")]
    MissingOption {
        source_name: String,
        option: &'static str,
    },

    /// Anything else the adapter wants to report
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(Box::new(err))
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidPayload(err.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(Box::new(err))
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Result type alias for source adapter operations.
pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Result type alias for normalization.
pub type NormalizeResult<T> = std::result::Result<T, MalformedRecord>;
