//! Testing utilities including mock implementations.
//!
//! These let applications exercise the pipeline without network access or
//! a database: scripted sources, a store that fails on demand, a notifier
//! that keeps what it receives, and a builder for canonical jobs.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{PipelineError, Result, SourceError, SourceResult};
use crate::traits::{notifier::Notifier, source::SourceAdapter, store::BatchResult, store::JobStore};
use crate::types::config::SourceConfig;
use crate::types::job::{Job, JobId, JobStatus, Source, WorkMode};
use crate::types::raw::RawRecord;
use crate::types::summary::RunSummary;

/// Midnight UTC, 2024-06-15.
const FIXTURE_DAY_SECS: i64 = 1_718_409_600;

/// A scripted source adapter.
///
/// Returns its records (or its failure) after an optional delay, and
/// remembers which sources asked.
#[derive(Clone, Default)]
pub struct MockSource {
    name: String,
    records: Arc<RwLock<Vec<RawRecord>>>,
    failure: Option<String>,
    delay: Option<Duration>,

    /// Call tracking: source names in call order
    calls: Arc<RwLock<Vec<String>>>,
}

impl MockSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_records(self, records: impl IntoIterator<Item = RawRecord>) -> Self {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(records);
        self
    }

    /// Fail every fetch with `message`.
    pub fn fail_with(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Sleep before answering, to trip budgets and deadlines.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl SourceAdapter for MockSource {
    async fn fetch(&self, config: &SourceConfig) -> SourceResult<Vec<RawRecord>> {
        self.calls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(config.name.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.failure {
            return Err(SourceError::Other(message.clone()));
        }

        Ok(self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Wraps a store and injects write failures.
///
/// - `fail_times(n)`: the next `n` batch writes error out entirely
/// - `reject_once(id)`: the first batch containing `id` reports it failed
/// - `with_delay(d)`: every batch write sleeps first
pub struct FlakyStore<S> {
    inner: S,
    failures_left: Mutex<usize>,
    reject_once: Mutex<HashSet<JobId>>,
    delay: Option<Duration>,
    batch_sizes: Mutex<Vec<usize>>,
}

impl<S: JobStore> FlakyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failures_left: Mutex::new(0),
            reject_once: Mutex::new(HashSet::new()),
            delay: None,
            batch_sizes: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_times(self, times: usize) -> Self {
        *self.failures_left.lock().unwrap_or_else(PoisonError::into_inner) = times;
        self
    }

    pub fn reject_once(self, id: JobId) -> Self {
        self.reject_once
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `upsert_batch` calls so far.
    pub fn attempts(&self) -> usize {
        self.batch_sizes().len()
    }

    /// Size of each batch passed to `upsert_batch`, in call order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: JobStore> JobStore for FlakyStore<S> {
    async fn upsert_batch(&self, jobs: &[Job]) -> Result<BatchResult> {
        self.batch_sizes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(jobs.len());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        {
            let mut left = self.failures_left.lock().unwrap_or_else(PoisonError::into_inner);
            if *left > 0 {
                *left -= 1;
                return Err(PipelineError::storage("injected write failure"));
            }
        }

        let (rejected, accepted): (Vec<&Job>, Vec<&Job>) = {
            let mut reject = self.reject_once.lock().unwrap_or_else(PoisonError::into_inner);
            jobs.iter().partition(|job| reject.remove(&job.id))
        };

        let accepted: Vec<Job> = accepted.into_iter().cloned().collect();
        let mut result = self.inner.upsert_batch(&accepted).await?;
        result.failed.extend(rejected.into_iter().map(|job| job.id.clone()));
        Ok(result)
    }

    async fn get_job(&self, id: &JobId) -> Result<Option<Job>> {
        self.inner.get_job(id).await
    }

    async fn list_by_status(&self, status: JobStatus, limit: usize) -> Result<Vec<Job>> {
        self.inner.list_by_status(status, limit).await
    }

    async fn list_by_skill(&self, skill: &str, limit: usize) -> Result<Vec<Job>> {
        self.inner.list_by_skill(skill, limit).await
    }

    async fn transition_status(&self, id: &JobId, to: JobStatus) -> Result<Job> {
        self.inner.transition_status(id, to).await
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        self.inner.purge_expired(now).await
    }

    async fn count(&self) -> Result<usize> {
        self.inner.count().await
    }
}

/// Notifier that keeps every summary it receives.
#[derive(Default)]
pub struct RecordingNotifier {
    summaries: RwLock<Vec<RunSummary>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summaries(&self) -> Vec<RunSummary> {
        self.summaries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, summary: &RunSummary) {
        self.summaries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(summary.clone());
    }
}

/// Builder for canonical jobs with sensible defaults.
///
/// Defaults: company "Acme", title "Data Engineer", onsite, posted
/// 2024-06-10, scraped 2024-06-15 12:00 UTC, expiring 30 days later.
#[derive(Debug, Clone)]
pub struct JobFixture {
    job: Job,
}

impl JobFixture {
    pub fn new(source: Source, native_id: &str) -> Self {
        let scraped_at = fixture_time(12);
        let job = Job {
            id: JobId::derive(&source, native_id),
            source_id: native_id.to_string(),
            company_name: "Acme".to_string(),
            title: "Data Engineer".to_string(),
            location: "Minneapolis, MN".to_string(),
            work_mode: WorkMode::Onsite,
            skills: BTreeSet::new(),
            salary_min: None,
            salary_max: None,
            visa_sponsorship: None,
            description: String::new(),
            application_link: format!(
                "https://jobs.example.com/{}/{}",
                source.as_str(),
                native_id
            ),
            posted_date: NaiveDate::from_ymd_opt(2024, 6, 10).unwrap_or_default(),
            scraped_at,
            status: JobStatus::New,
            match_score: None,
            expires_at: scraped_at + chrono::Duration::days(30),
            source,
        };
        Self { job }
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.job.company_name = company.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.job.title = title.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.job.location = location.into();
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.job.application_link = link.into();
        self
    }

    pub fn with_work_mode(mut self, mode: WorkMode) -> Self {
        self.job.work_mode = mode;
        self
    }

    pub fn with_skills(mut self, skills: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.job.skills = skills.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_salary(mut self, min: Option<i64>, max: Option<i64>) -> Self {
        self.job.salary_min = min;
        self.job.salary_max = max;
        self
    }

    pub fn with_visa(mut self, visa: Option<bool>) -> Self {
        self.job.visa_sponsorship = visa;
        self
    }

    /// Scrape time on the fixture day; moves `expires_at` along.
    pub fn with_scraped_hour(self, hour: u32) -> Self {
        self.with_scraped_at(fixture_time(hour))
    }

    pub fn with_scraped_at(mut self, at: DateTime<Utc>) -> Self {
        self.job.scraped_at = at;
        self.job.expires_at = at + chrono::Duration::days(30);
        self
    }

    pub fn build(self) -> Job {
        self.job
    }
}

fn fixture_time(hour: u32) -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
        + chrono::Duration::seconds(FIXTURE_DAY_SECS)
        + chrono::Duration::hours(hour as i64)
}
