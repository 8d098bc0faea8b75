//! Batched, retried writes to the job store.
//!
//! Jobs are committed in sequential batches no larger than the store limit.
//! A batch that errors, times out or partially fails is retried with
//! exponential backoff; only the jobs still unwritten go into the retry.
//! Because upserts are idempotent by id, replaying a batch after a timeout
//! is safe.

use tokio::time::{sleep, timeout};
use tracing::{debug, error, warn};

use crate::error::PipelineError;
use crate::traits::store::{JobStore, MAX_BATCH_SIZE};
use crate::types::config::RetryConfig;
use crate::types::job::{Job, JobId};

/// Result of persisting every accepted job of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistOutcome {
    pub persisted: usize,
    pub failed: Vec<JobId>,
    /// One message per batch that gave up
    pub errors: Vec<String>,
}

/// Writes jobs to a store in bounded, retried batches.
pub struct BatchWriter<'a> {
    store: &'a dyn JobStore,
    batch_size: usize,
    retry: RetryConfig,
}

impl<'a> BatchWriter<'a> {
    /// `batch_size` is clamped to `1..=MAX_BATCH_SIZE`.
    pub fn new(store: &'a dyn JobStore, batch_size: usize, retry: RetryConfig) -> Self {
        Self {
            store,
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
            retry,
        }
    }

    pub async fn write_all(&self, jobs: &[Job]) -> PersistOutcome {
        let mut outcome = PersistOutcome::default();

        for (index, batch) in jobs.chunks(self.batch_size).enumerate() {
            match self.write_batch(batch).await {
                Ok(committed) => {
                    debug!(batch = index, committed, "Batch persisted");
                    outcome.persisted += committed;
                }
                Err((committed, failed, err)) => {
                    error!(batch = index, error = %err, "Batch failed after all retries");
                    outcome.persisted += committed;
                    outcome.failed.extend(failed);
                    outcome.errors.push(err.to_string());
                }
            }
        }

        outcome
    }

    /// Write one batch. On failure returns how many jobs did commit, the
    /// ids that never did, and the final error.
    async fn write_batch(
        &self,
        batch: &[Job],
    ) -> std::result::Result<usize, (usize, Vec<JobId>, PipelineError)> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut pending: Vec<Job> = batch.to_vec();
        let mut committed = 0;
        let mut attempt = 0;

        loop {
            attempt += 1;

            let reason = match timeout(self.retry.attempt_timeout(), self.store.upsert_batch(&pending)).await {
                Ok(Ok(result)) => {
                    committed += result.committed;
                    if result.failed.is_empty() {
                        return Ok(committed);
                    }
                    pending.retain(|job| result.failed.contains(&job.id));
                    format!("{} jobs not written", pending.len())
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("attempt timed out after {:?}", self.retry.attempt_timeout()),
            };

            if attempt >= max_attempts {
                let failed = pending.iter().map(|job| job.id.clone()).collect();
                let err = PipelineError::PersistenceBatchFailure {
                    job_count: pending.len(),
                    attempts: attempt,
                    reason,
                };
                return Err((committed, failed, err));
            }

            let delay = self.retry.delay_for(attempt);
            warn!(
                error = %reason,
                retry = attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Batch write failed, retrying..."
            );
            sleep(delay).await;
        }
    }
}
