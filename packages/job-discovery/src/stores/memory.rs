//! In-memory job store for tests and single-process runs.

use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{PipelineError, Result};
use crate::pipeline::skills::fold_skill;
use crate::traits::store::{check_batch_size, check_transition, BatchResult, JobStore};
use crate::types::job::{Job, JobId, JobStatus};

#[derive(Debug, Default)]
struct Tables {
    jobs: HashMap<JobId, Job>,
    by_status: HashMap<JobStatus, BTreeSet<JobId>>,
    by_skill: HashMap<String, BTreeSet<JobId>>,
}

impl Tables {
    fn index(&mut self, job: &Job) {
        self.by_status
            .entry(job.status)
            .or_default()
            .insert(job.id.clone());
        for skill in &job.skills {
            self.by_skill
                .entry(skill.clone())
                .or_default()
                .insert(job.id.clone());
        }
    }

    fn unindex(&mut self, job: &Job) {
        if let Some(ids) = self.by_status.get_mut(&job.status) {
            ids.remove(&job.id);
        }
        for skill in &job.skills {
            if let Some(ids) = self.by_skill.get_mut(skill) {
                ids.remove(&job.id);
            }
        }
    }

    fn remove(&mut self, id: &JobId) -> Option<Job> {
        let job = self.jobs.remove(id)?;
        self.unindex(&job);
        Some(job)
    }

    fn put(&mut self, job: Job) {
        self.remove(&job.id);
        self.index(&job);
        self.jobs.insert(job.id.clone(), job);
    }

    fn collect<'a>(&'a self, ids: Option<&'a BTreeSet<JobId>>) -> Vec<&'a Job> {
        ids.into_iter()
            .flatten()
            .filter_map(|id| self.jobs.get(id))
            .collect()
    }
}

/// Job store backed by hash maps, with status and skill indexes kept
/// under the same lock as the records.
///
/// Data is lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove everything.
    pub fn clear(&self) {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        *tables = Tables::default();
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn upsert_batch(&self, jobs: &[Job]) -> Result<BatchResult> {
        check_batch_size(jobs)?;
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);

        for job in jobs {
            let mut incoming = job.clone();
            if let Some(existing) = tables.jobs.get(&job.id) {
                incoming.status = existing.status;
            }
            tables.put(incoming);
        }

        Ok(BatchResult::all_committed(jobs.len()))
    }

    async fn get_job(&self, id: &JobId) -> Result<Option<Job>> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables.jobs.get(id).cloned())
    }

    async fn list_by_status(&self, status: JobStatus, limit: usize) -> Result<Vec<Job>> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let mut jobs = tables.collect(tables.by_status.get(&status));
        jobs.sort_by(|a, b| b.posted_date.cmp(&a.posted_date).then_with(|| a.id.cmp(&b.id)));
        Ok(jobs.into_iter().take(limit).cloned().collect())
    }

    async fn list_by_skill(&self, skill: &str, limit: usize) -> Result<Vec<Job>> {
        let Some(skill) = fold_skill(skill) else {
            return Ok(Vec::new());
        };
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let mut jobs = tables.collect(tables.by_skill.get(&skill));
        jobs.sort_by(|a, b| {
            let (sa, sb) = (a.match_score.unwrap_or(-1.0), b.match_score.unwrap_or(-1.0));
            sb.total_cmp(&sa).then_with(|| a.id.cmp(&b.id))
        });
        Ok(jobs.into_iter().take(limit).cloned().collect())
    }

    async fn transition_status(&self, id: &JobId, to: JobStatus) -> Result<Job> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let mut job = tables
            .jobs
            .get(id)
            .cloned()
            .ok_or_else(|| PipelineError::JobNotFound(id.clone()))?;

        check_transition(&job, to)?;
        job.status = to;
        tables.put(job.clone());
        Ok(job)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let expired: Vec<JobId> = tables
            .jobs
            .values()
            .filter(|job| job.is_expired(now))
            .map(|job| job.id.clone())
            .collect();
        for id in &expired {
            tables.remove(id);
        }
        Ok(expired.len())
    }

    async fn count(&self) -> Result<usize> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables.jobs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::JobFixture;
    use crate::types::job::Source;
    use chrono::{Duration, NaiveDate};

    fn job(native: &str) -> Job {
        JobFixture::new(Source::Indeed, native).build()
    }

    #[tokio::test]
    async fn test_double_commit_is_idempotent() {
        let store = MemoryStore::new();
        let batch = vec![job("1"), job("2")];

        store.upsert_batch(&batch).await.unwrap();
        store.upsert_batch(&batch).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 2);
        assert_eq!(store.list_by_status(JobStatus::New, 10).await.unwrap().len(), 2);
        assert_eq!(store.get_job(&batch[0].id).await.unwrap(), Some(batch[0].clone()));
    }

    #[tokio::test]
    async fn test_oversized_batch_is_refused() {
        let store = MemoryStore::new();
        let batch: Vec<Job> = (0..26).map(|i| job(&i.to_string())).collect();

        let err = store.upsert_batch(&batch).await.unwrap_err();
        assert!(matches!(err, PipelineError::BatchTooLarge { size: 26, max: 25 }));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upsert_keeps_lifecycle_status() {
        let store = MemoryStore::new();
        let original = job("1");
        store.upsert_batch(&[original.clone()]).await.unwrap();
        store
            .transition_status(&original.id, JobStatus::Applied)
            .await
            .unwrap();

        let mut refreshed = original.clone();
        refreshed.title = "Staff Data Engineer".into();
        store.upsert_batch(&[refreshed]).await.unwrap();

        let stored = store.get_job(&original.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Applied);
        assert_eq!(stored.title, "Staff Data Engineer");
        assert!(store.list_by_status(JobStatus::New, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_by_status_newest_first() {
        let store = MemoryStore::new();
        let mut old = job("old");
        old.posted_date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let mut new = job("new");
        new.posted_date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        store.upsert_batch(&[old, new]).await.unwrap();

        let listed = store.list_by_status(JobStatus::New, 10).await.unwrap();
        assert_eq!(listed[0].source_id, "new");
        assert_eq!(store.list_by_status(JobStatus::New, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_by_skill_best_score_first() {
        let store = MemoryStore::new();
        let mut low = JobFixture::new(Source::Indeed, "low").with_skills(["kubernetes"]).build();
        low.match_score = Some(0.2);
        let mut high = JobFixture::new(Source::Indeed, "high").with_skills(["kubernetes"]).build();
        high.match_score = Some(0.9);
        let other = JobFixture::new(Source::Indeed, "other").with_skills(["sql"]).build();
        store.upsert_batch(&[low, high, other]).await.unwrap();

        let listed = store.list_by_skill("K8s", 10).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|j| j.source_id.as_str()).collect();
        assert_eq!(ids, vec!["high", "low"]);
    }

    #[tokio::test]
    async fn test_transition_rules() {
        let store = MemoryStore::new();
        let job = job("1");
        store.upsert_batch(&[job.clone()]).await.unwrap();

        let rejected = store
            .transition_status(&job.id, JobStatus::Rejected)
            .await
            .unwrap();
        assert_eq!(rejected.status, JobStatus::Rejected);

        let err = store
            .transition_status(&job.id, JobStatus::Applied)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTransition { .. }));

        let missing = store
            .transition_status(&JobId::from_raw("indeed_404"), JobStatus::Applied)
            .await
            .unwrap_err();
        assert!(matches!(missing, PipelineError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryStore::new();
        let fresh = job("fresh");
        let mut stale = job("stale");
        stale.expires_at = fresh.scraped_at - Duration::days(1);
        store.upsert_batch(&[fresh.clone(), stale]).await.unwrap();

        let removed = store.purge_expired(fresh.scraped_at).await.unwrap();

        assert_eq!(removed, 1);
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(store.get_job(&fresh.id).await.unwrap().is_some());
    }
}
