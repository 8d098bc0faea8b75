//! Persistence gateway trait.
//!
//! The store is keyed by `JobId` and every write is an upsert, so replaying
//! a batch (after a retry, or from an overlapping run) leaves the same state
//! as writing it once. Two read paths are required of every backend:
//! - by status, newest posting first
//! - by skill, best match score first

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::types::job::{Job, JobId, JobStatus};

/// Largest batch a single `upsert_batch` call accepts.
pub const MAX_BATCH_SIZE: usize = 25;

/// Outcome of one batch write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub committed: usize,
    /// Jobs of the batch that were not written
    pub failed: Vec<JobId>,
}

impl BatchResult {
    /// All `count` jobs written.
    pub fn all_committed(count: usize) -> Self {
        Self {
            committed: count,
            failed: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Durable job store with secondary indexes.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert or refresh up to `MAX_BATCH_SIZE` jobs, keyed by `id`.
    ///
    /// An existing record keeps its lifecycle status; every other field is
    /// replaced by the incoming one.
    ///
    /// Timestamps are kept to the millisecond. The normalizer truncates
    /// `scraped_at` accordingly, so normalized jobs read back unchanged.
    async fn upsert_batch(&self, jobs: &[Job]) -> Result<BatchResult>;

    /// Get one job by id.
    async fn get_job(&self, id: &JobId) -> Result<Option<Job>>;

    /// Jobs in `status`, newest `posted_date` first.
    async fn list_by_status(&self, status: JobStatus, limit: usize) -> Result<Vec<Job>>;

    /// Jobs mentioning `skill`, highest `match_score` first.
    async fn list_by_skill(&self, skill: &str, limit: usize) -> Result<Vec<Job>>;

    /// Move a job forward in its lifecycle.
    async fn transition_status(&self, id: &JobId, to: JobStatus) -> Result<Job>;

    /// Remove jobs whose `expires_at` is at or before `now`.
    ///
    /// Returns the number of jobs removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize>;

    /// Number of stored jobs.
    async fn count(&self) -> Result<usize>;
}

/// Reject a batch that exceeds the store limit.
pub fn check_batch_size(jobs: &[Job]) -> Result<()> {
    if jobs.len() > MAX_BATCH_SIZE {
        return Err(PipelineError::BatchTooLarge {
            size: jobs.len(),
            max: MAX_BATCH_SIZE,
        });
    }
    Ok(())
}

/// Validate a lifecycle move for `job`.
pub fn check_transition(job: &Job, to: JobStatus) -> Result<()> {
    if !job.status.can_transition_to(to) {
        return Err(PipelineError::InvalidTransition {
            id: job.id.clone(),
            from: job.status,
            to,
        });
    }
    Ok(())
}
