//! Pipeline orchestrator - one run from fan-out to summary.
//!
//! ```text
//! Scheduled → SourcesRunning → Aggregated → Filtered → Persisted → Completed
//!                  └──────────────→ PartiallyFailed ←──────────┘
//! ```
//!
//! Sources are fetched concurrently, each raced against its own budget, the
//! run deadline and the cancellation token. Everything after the fan-out
//! runs over the full in-memory batch. Counts accumulate in the
//! [`RunSummary`], which is returned and handed to the notifier.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use job_discovery::{JsonFileSource, MemoryStore, Orchestrator};
//!
//! let orchestrator = Orchestrator::new(Arc::new(MemoryStore::new()))
//!     .with_adapter(Arc::new(JsonFileSource::new()));
//! let summary = orchestrator.run(&config).await?;
//! println!("{} persisted", summary.persisted);
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use tokio::time::{sleep_until, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::pipeline::dedup::{Deduplicator, DuplicatePolicy};
use crate::pipeline::normalize::Normalizer;
use crate::pipeline::persist::BatchWriter;
use crate::pipeline::score::Scorer;
use crate::traits::notifier::Notifier;
use crate::traits::source::SourceAdapter;
use crate::traits::store::JobStore;
use crate::types::config::{PipelineConfig, SourceConfig};
use crate::types::job::{Job, Source};
use crate::types::raw::RawRecord;
use crate::types::summary::{
    AdapterFailure, AdapterFailureKind, RunState, RunSummary, TopMatch,
};

/// Accepted jobs listed in a summary.
pub const TOP_MATCHES: usize = 10;

/// How one source's fetch ended.
#[derive(Debug)]
enum FetchOutcome {
    Fetched(Vec<RawRecord>),
    Failed(PipelineError),
    /// Cut off by the run deadline or cancellation
    Cancelled,
}

/// Drives pipeline runs against a set of adapters and one store.
pub struct Orchestrator {
    adapters: HashMap<String, Arc<dyn SourceAdapter>>,
    store: Arc<dyn JobStore>,
    notifier: Option<Arc<dyn Notifier>>,
    deduplicator: Deduplicator,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            adapters: HashMap::new(),
            store,
            notifier: None,
            deduplicator: Deduplicator::default(),
        }
    }

    /// Register an adapter under its `name()`.
    pub fn with_adapter(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.adapters
            .insert(adapter.name().to_lowercase(), adapter);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_duplicate_policy(mut self, policy: impl DuplicatePolicy + 'static) -> Self {
        self.deduplicator = Deduplicator::new(policy);
        self
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Execute one run to completion.
    ///
    /// Source, record and batch failures end up in the summary; only an
    /// invalid configuration is returned as an error.
    pub async fn run(&self, config: &PipelineConfig) -> Result<RunSummary> {
        self.run_with_cancel(config, CancellationToken::new()).await
    }

    /// Like [`run`](Self::run), stopping pending sources when `cancel` fires.
    pub async fn run_with_cancel(
        &self,
        config: &PipelineConfig,
        cancel: CancellationToken,
    ) -> Result<RunSummary> {
        config.validate()?;
        let normalizer = Normalizer::new(&config.normalizer, config.retention())?;

        let mut summary = RunSummary::new();
        info!(
            run_id = %summary.run_id,
            sources = config.sources.len(),
            "Starting pipeline run"
        );

        summary.transition(RunState::SourcesRunning);
        let batches = self.fetch_all(config, &cancel, &mut summary).await;

        if batches.is_empty() {
            warn!(run_id = %summary.run_id, "No source produced a batch");
            summary
                .errors
                .push(PipelineError::NoSourcesSucceeded.to_string());
            summary.transition(RunState::PartiallyFailed);
            self.notify(&summary).await;
            return Ok(summary);
        }
        summary.transition(RunState::Aggregated);

        let jobs = normalize_batches(&normalizer, batches, &mut summary);

        let deduped = self.deduplicator.deduplicate(jobs);
        summary.duplicates_merged = deduped.duplicates_merged;

        let scorer = Scorer::new(&config.filter);
        let mut accepted: Vec<Job> = Vec::new();
        for job in deduped.jobs {
            let scored = scorer.score(job);
            if scored.decision.is_accepted() {
                accepted.push(scored.job);
            } else {
                summary.rejected += 1;
            }
        }
        summary.accepted = accepted.len();
        summary.transition(RunState::Filtered);

        let writer = BatchWriter::new(self.store.as_ref(), config.batch_size, config.retry.clone());
        let persisted = writer.write_all(&accepted).await;
        summary.persisted = persisted.persisted;
        summary.failed_to_persist = persisted.failed;
        summary.errors.extend(persisted.errors);
        summary.top_matches = top_matches(&accepted);
        summary.transition(RunState::Persisted);

        if summary.persisted == 0 && !summary.failed_to_persist.is_empty() {
            summary.transition(RunState::PartiallyFailed);
        } else {
            summary.transition(RunState::Completed);
        }

        info!(
            run_id = %summary.run_id,
            state = %summary.state,
            discovered = summary.discovered,
            accepted = summary.accepted,
            persisted = summary.persisted,
            "Pipeline run finished"
        );
        self.notify(&summary).await;
        Ok(summary)
    }

    /// Fan out to every configured source. Returns the successful batches
    /// in configuration order; failures and cut-offs go into the summary.
    async fn fetch_all(
        &self,
        config: &PipelineConfig,
        cancel: &CancellationToken,
        summary: &mut RunSummary,
    ) -> Vec<(SourceConfig, Vec<RawRecord>)> {
        let deadline = tokio::time::Instant::now() + config.run_timeout();

        let fetches = config.sources.iter().map(|source| {
            let adapter = self.adapters.get(&source.adapter_name().to_lowercase()).cloned();
            let budget = config.budget_for(source);
            let cancel = cancel.clone();
            let source = source.clone();

            async move {
                let Some(adapter) = adapter else {
                    let reason = format!("no adapter registered as '{}'", source.adapter_name());
                    let outcome = FetchOutcome::Failed(PipelineError::AdapterFailure {
                        source_name: source.name.clone(),
                        reason,
                    });
                    return (source, outcome, Duration::ZERO);
                };

                let started = Instant::now();
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => FetchOutcome::Cancelled,
                    _ = sleep_until(deadline) => FetchOutcome::Cancelled,
                    result = timeout(budget, adapter.fetch(&source)) => match result {
                        Ok(Ok(records)) => FetchOutcome::Fetched(records),
                        Ok(Err(e)) => FetchOutcome::Failed(PipelineError::AdapterFailure {
                            source_name: source.name.clone(),
                            reason: e.to_string(),
                        }),
                        Err(_) => FetchOutcome::Failed(PipelineError::AdapterTimeout {
                            source_name: source.name.clone(),
                            budget,
                        }),
                    },
                };
                (source, outcome, started.elapsed())
            }
        });

        let mut batches = Vec::new();
        for (source, outcome, elapsed) in join_all(fetches).await {
            let elapsed_ms = elapsed.as_millis() as u64;
            match outcome {
                FetchOutcome::Fetched(records) => {
                    info!(source = %source.name, records = records.len(), elapsed_ms, "Source fetched");
                    summary.discovered += records.len();
                    summary.source_stats(&source.name).records += records.len();
                    batches.push((source, records));
                }
                FetchOutcome::Failed(err) => {
                    warn!(source = %source.name, error = %err, elapsed_ms, "Source failed");
                    let kind = match err {
                        PipelineError::AdapterTimeout { .. } => AdapterFailureKind::Timeout,
                        _ => AdapterFailureKind::Failure,
                    };
                    summary.adapter_failures.push(AdapterFailure {
                        source: source.name.clone(),
                        kind,
                        message: err.to_string(),
                    });
                    summary.source_stats(&source.name);
                }
                FetchOutcome::Cancelled => {
                    info!(source = %source.name, elapsed_ms, "Source cancelled");
                    summary.cancelled_sources.push(source.name.clone());
                    summary.source_stats(&source.name);
                }
            }
        }
        batches
    }

    async fn notify(&self, summary: &RunSummary) {
        if let Some(notifier) = &self.notifier {
            notifier.notify(summary).await;
        }
    }
}

/// Normalize every record, counting malformed ones per source.
fn normalize_batches(
    normalizer: &Normalizer,
    batches: Vec<(SourceConfig, Vec<RawRecord>)>,
    summary: &mut RunSummary,
) -> Vec<Job> {
    let now = Utc::now();
    let mut jobs = Vec::new();

    for (config, records) in batches {
        let source = Source::from(config.name.as_str());
        for record in records {
            match normalizer.normalize(&record, &source, now) {
                Ok(job) => {
                    summary.source_stats(&config.name).normalized += 1;
                    jobs.push(job);
                }
                Err(e) => {
                    debug!(source = %config.name, error = %e, "Dropping malformed record");
                    summary.malformed += 1;
                    summary.source_stats(&config.name).malformed += 1;
                }
            }
        }
    }

    jobs
}

/// Best accepted jobs by score, ties broken by id.
fn top_matches(accepted: &[Job]) -> Vec<TopMatch> {
    let mut ranked: Vec<&Job> = accepted.iter().collect();
    ranked.sort_by(|a, b| {
        let (sa, sb) = (a.match_score.unwrap_or(0.0), b.match_score.unwrap_or(0.0));
        sb.total_cmp(&sa).then_with(|| a.id.cmp(&b.id))
    });
    ranked.into_iter().take(TOP_MATCHES).map(TopMatch::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;
    use crate::testing::{MockSource, RecordingNotifier};
    use crate::types::config::{FilterConfig, RetryConfig, SkillCriteria};
    use serde_json::json;

    fn record(id: &str, skills: &[&str]) -> RawRecord {
        RawRecord::from_value(json!({
            "id": id,
            "title": format!("Engineer {id}"),
            "company": format!("Company {id}"),
            "link": format!("https://jobs.example.com/{id}"),
            "posted_date": "2024-06-10",
            "skills": skills,
        }))
    }

    fn config(sources: &[&str]) -> PipelineConfig {
        sources.iter().fold(PipelineConfig::new(), |config, name| {
            config.with_source(SourceConfig::new(*name))
        })
    }

    #[tokio::test]
    async fn test_happy_path_visits_every_state() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let orchestrator = Orchestrator::new(store.clone())
            .with_adapter(Arc::new(
                MockSource::new("indeed").with_records(vec![record("1", &["python"]), record("2", &[])]),
            ))
            .with_notifier(notifier.clone());

        let summary = orchestrator.run(&config(&["indeed"])).await.unwrap();

        assert_eq!(
            summary.transitions,
            vec![
                RunState::Scheduled,
                RunState::SourcesRunning,
                RunState::Aggregated,
                RunState::Filtered,
                RunState::Persisted,
                RunState::Completed,
            ]
        );
        assert!(summary.is_clean());
        assert_eq!(summary.discovered, 2);
        assert_eq!(summary.persisted, 2);
        assert_eq!(store.count().await.unwrap(), 2);
        assert!(summary.finished_at.is_some());
        assert_eq!(notifier.summaries().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_and_rejected_are_counted() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = Orchestrator::new(store).with_adapter(Arc::new(
            MockSource::new("indeed").with_records(vec![
                record("1", &["python", "sql"]),
                record("2", &["python"]),
                RawRecord::new().with_field("title", "No id"),
            ]),
        ));
        let config = config(&["indeed"]).with_filter(
            FilterConfig::new(SkillCriteria::flat(["python", "sql"])).with_min_skill_matches(2),
        );

        let summary = orchestrator.run(&config).await.unwrap();

        assert_eq!(summary.malformed, 1);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.accepted, 1);
        assert_eq!(summary.per_source["indeed"].malformed, 1);
        assert_eq!(summary.per_source["indeed"].normalized, 2);
        assert_eq!(summary.top_matches.len(), 1);
        assert_eq!(summary.top_matches[0].match_score, 1.0);
    }

    #[tokio::test]
    async fn test_out_of_range_date_is_dropped_not_fatal() {
        let store = Arc::new(MemoryStore::new());
        let mut ancient = record("2", &[]).into_value();
        ancient["posted_date"] = json!("1000000000 days ago");
        let orchestrator = Orchestrator::new(store.clone()).with_adapter(Arc::new(
            MockSource::new("indeed")
                .with_records(vec![record("1", &[]), RawRecord::from_value(ancient)]),
        ));

        let summary = orchestrator.run(&config(&["indeed"])).await.unwrap();

        assert!(summary.is_completed());
        assert_eq!(summary.malformed, 1);
        assert_eq!(summary.persisted, 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unregistered_adapter_is_a_failure() {
        let orchestrator = Orchestrator::new(Arc::new(MemoryStore::new()))
            .with_adapter(Arc::new(MockSource::new("indeed").with_records(vec![record("1", &[])])));

        let summary = orchestrator.run(&config(&["indeed", "dice"])).await.unwrap();

        assert!(summary.is_completed());
        assert_eq!(summary.adapter_failures.len(), 1);
        assert_eq!(summary.adapter_failures[0].source, "dice");
        assert_eq!(summary.adapter_failures[0].kind, AdapterFailureKind::Failure);
    }

    #[tokio::test]
    async fn test_cancelled_run_counts_no_success() {
        let orchestrator = Orchestrator::new(Arc::new(MemoryStore::new())).with_adapter(Arc::new(
            MockSource::new("indeed")
                .with_records(vec![record("1", &[])])
                .with_delay(Duration::from_secs(30)),
        ));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = orchestrator
            .run_with_cancel(&config(&["indeed"]), cancel)
            .await
            .unwrap();

        assert_eq!(summary.state, RunState::PartiallyFailed);
        assert_eq!(summary.cancelled_sources, vec!["indeed".to_string()]);
        assert!(summary.adapter_failures.is_empty());
    }

    #[tokio::test]
    async fn test_run_deadline_cuts_off_slow_source() {
        let orchestrator = Orchestrator::new(Arc::new(MemoryStore::new()))
            .with_adapter(Arc::new(MockSource::new("indeed").with_records(vec![record("1", &[])])))
            .with_adapter(Arc::new(
                MockSource::new("slow")
                    .with_records(vec![record("2", &[])])
                    .with_delay(Duration::from_secs(30)),
            ));
        let config = config(&["indeed", "slow"]).with_run_timeout(Duration::from_millis(100));

        let summary = orchestrator.run(&config).await.unwrap();

        assert!(summary.is_completed());
        assert_eq!(summary.persisted, 1);
        assert_eq!(summary.cancelled_sources, vec!["slow".to_string()]);
    }

    #[tokio::test]
    async fn test_zero_persisted_after_failures_is_partial() {
        let store = Arc::new(crate::testing::FlakyStore::new(MemoryStore::new()).fail_times(100));
        let orchestrator = Orchestrator::new(store)
            .with_adapter(Arc::new(MockSource::new("indeed").with_records(vec![record("1", &[])])));
        let config = config(&["indeed"]).with_retry(RetryConfig {
            max_attempts: 2,
            base_delay_ms: 1,
            max_delay_ms: 2,
            attempt_timeout_ms: 1_000,
        });

        let summary = orchestrator.run(&config).await.unwrap();

        assert_eq!(summary.state, RunState::PartiallyFailed);
        assert_eq!(summary.failed_to_persist.len(), 1);
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.transitions.contains(&RunState::Persisted));
    }

    #[tokio::test]
    async fn test_invalid_config_is_an_error() {
        let orchestrator = Orchestrator::new(Arc::new(MemoryStore::new()));
        let err = orchestrator.run(&PipelineConfig::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));

        let huge_retention = config(&["indeed"]).with_retention_days(1_000_000_000);
        let err = orchestrator.run(&huge_retention).await.unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_top_matches_are_ranked_and_capped() {
        let jobs: Vec<Job> = (0..12)
            .map(|i| {
                let mut job = crate::testing::JobFixture::new(Source::Indeed, &format!("{i:02}")).build();
                job.match_score = Some((i % 4) as f64 / 4.0);
                job
            })
            .collect();

        let top = top_matches(&jobs);

        assert_eq!(top.len(), TOP_MATCHES);
        assert_eq!(top[0].id.as_str(), "indeed_03");
        assert_eq!(top[0].match_score, 0.75);
        assert!(top.windows(2).all(|w| w[0].match_score >= w[1].match_score));
    }
}
