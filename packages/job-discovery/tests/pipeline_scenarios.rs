//! End-to-end runs through the orchestrator with mock sources.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use job_discovery::{
    AdapterFailureKind, FilterConfig, JobId, JobStatus, JobStore, JsonFileSource,
    MalformedRecord, MemoryStore, MockSource, Normalizer, NormalizerConfig, Orchestrator,
    PipelineConfig, RawRecord, RetryConfig, RunState, SkillCriteria, Source, SourceConfig,
};
use proptest::prelude::*;
use serde_json::json;

fn indeed_record(key: &str, skills: &[&str]) -> RawRecord {
    RawRecord::from_value(json!({
        "job_key": key,
        "title": "Senior Data Engineer",
        "company": "Northwind",
        "location": "Remote",
        "link": format!("https://www.indeed.com/viewjob?jk={key}"),
        "posted_date": "2 days ago",
        "salary": "$140,000 - $170,000 a year",
        "skills": skills,
    }))
}

fn board_record(board: &str, id: u32) -> RawRecord {
    RawRecord::from_value(json!({
        "id": id.to_string(),
        "title": format!("{board} role {id}"),
        "company": format!("{board} Co {id}"),
        "link": format!("https://{board}.example.com/jobs/{id}"),
        "posted_date": "2024-06-01",
        "skills": ["python"],
    }))
}

fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 2,
        base_delay_ms: 1,
        max_delay_ms: 2,
        attempt_timeout_ms: 1_000,
    }
}

#[tokio::test]
async fn cross_listed_posting_is_stored_once() {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = Orchestrator::new(store.clone()).with_adapter(Arc::new(
        MockSource::new("indeed")
            .with_records(vec![indeed_record("1", &["python"]), indeed_record("2", &["spark"])]),
    ));
    let config = PipelineConfig::new().with_source(SourceConfig::new("indeed"));

    let summary = orchestrator.run(&config).await.unwrap();

    assert_eq!(summary.state, RunState::Completed);
    assert_eq!(summary.discovered, 2);
    assert_eq!(summary.duplicates_merged, 1);
    assert_eq!(summary.persisted, 1);

    let job = store
        .get_job(&JobId::from_raw("indeed_1"))
        .await
        .unwrap()
        .unwrap();
    assert!(job.skills.contains("python") && job.skills.contains("spark"));
    assert_eq!(job.salary_min, Some(140_000));
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn one_timed_out_source_does_not_fail_the_run() {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = Orchestrator::new(store.clone())
        .with_adapter(Arc::new(
            MockSource::new("linkedin").with_records(vec![board_record("linkedin", 1)]),
        ))
        .with_adapter(Arc::new(
            MockSource::new("glassdoor").with_records(vec![board_record("glassdoor", 2)]),
        ))
        .with_adapter(Arc::new(
            MockSource::new("indeed")
                .with_records(vec![board_record("indeed", 3)])
                .with_delay(Duration::from_secs(10)),
        ));
    let config = PipelineConfig::new()
        .with_source(SourceConfig::new("linkedin"))
        .with_source(SourceConfig::new("glassdoor"))
        .with_source(SourceConfig::new("indeed").with_budget(Duration::from_millis(50)));

    let summary = orchestrator.run(&config).await.unwrap();

    assert_eq!(summary.state, RunState::Completed);
    assert_eq!(summary.adapter_failures.len(), 1);
    assert_eq!(summary.adapter_failures[0].source, "indeed");
    assert_eq!(summary.adapter_failures[0].kind, AdapterFailureKind::Timeout);
    assert_eq!(summary.persisted, 2);
    assert_eq!(store.count().await.unwrap(), 2);
}

#[tokio::test]
async fn all_sources_failing_is_partial_failure() {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = Orchestrator::new(store.clone())
        .with_adapter(Arc::new(MockSource::new("linkedin").fail_with("blocked")))
        .with_adapter(Arc::new(MockSource::new("glassdoor").fail_with("captcha")))
        .with_adapter(Arc::new(MockSource::new("indeed").fail_with("503")));
    let config = PipelineConfig::new()
        .with_source(SourceConfig::new("linkedin"))
        .with_source(SourceConfig::new("glassdoor"))
        .with_source(SourceConfig::new("indeed"));

    let summary = orchestrator.run(&config).await.unwrap();

    assert_eq!(summary.state, RunState::PartiallyFailed);
    assert_eq!(summary.adapter_failures.len(), 3);
    assert_eq!(summary.persisted, 0);
    assert_eq!(store.count().await.unwrap(), 0);
    assert_eq!(
        summary.transitions,
        vec![
            RunState::Scheduled,
            RunState::SourcesRunning,
            RunState::PartiallyFailed
        ]
    );
}

#[tokio::test]
async fn rerunning_is_idempotent_and_keeps_progress() {
    let store = Arc::new(MemoryStore::new());
    let records: Vec<RawRecord> = (1..=30).map(|i| board_record("indeed", i)).collect();
    let orchestrator = Orchestrator::new(store.clone())
        .with_adapter(Arc::new(MockSource::new("indeed").with_records(records)));
    let config = PipelineConfig::new()
        .with_source(SourceConfig::new("indeed"))
        .with_retry(fast_retry());

    let first = orchestrator.run(&config).await.unwrap();
    store
        .transition_status(&JobId::from_raw("indeed_7"), JobStatus::Applied)
        .await
        .unwrap();
    let second = orchestrator.run(&config).await.unwrap();

    assert_eq!(first.persisted, 30);
    assert_eq!(second.persisted, 30);
    assert_eq!(store.count().await.unwrap(), 30);
    let applied = store.list_by_status(JobStatus::Applied, 10).await.unwrap();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].id.as_str(), "indeed_7");
}

#[tokio::test]
async fn strict_filter_rejects_partial_skill_match() {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = Orchestrator::new(store.clone()).with_adapter(Arc::new(
        MockSource::new("indeed").with_records(vec![RawRecord::from_value(json!({
            "id": "9",
            "title": "Data Engineer",
            "company": "Contoso",
            "link": "https://contoso.com/careers/9",
            "posted_date": "2024-06-01",
            "skills": ["Python", "SQL"],
            "salaryMax": 150000,
            "visa": true,
        }))]),
    ));
    let config = PipelineConfig::new()
        .with_source(SourceConfig::new("indeed"))
        .with_filter(
            FilterConfig::new(SkillCriteria::flat(["python", "sql", "airflow", "spark"]))
                .with_min_skill_matches(3)
                .with_min_salary(100_000)
                .require_visa(),
        );

    let summary = orchestrator.run(&config).await.unwrap();

    assert_eq!(summary.state, RunState::Completed);
    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.accepted, 0);
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn json_file_source_feeds_a_run() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    let payload = json!({ "jobs": [
        {"id": "a1", "title": "ETL Developer", "company": "Fabrikam",
         "url": "https://fabrikam.com/jobs/a1", "datePosted": "06/03/2024",
         "description": "Build pipelines with Airflow and Spark. Visa sponsorship available."},
        {"id": "a2", "title": "Broken", "company": "Fabrikam"}
    ]});
    write!(file, "{payload}").unwrap();

    let store = Arc::new(MemoryStore::new());
    let orchestrator =
        Orchestrator::new(store.clone()).with_adapter(Arc::new(JsonFileSource::new()));
    let config = PipelineConfig::new().with_source(
        SourceConfig::new("glassdoor")
            .with_adapter("json_file")
            .with_option("path", file.path().to_string_lossy()),
    );

    let summary = orchestrator.run(&config).await.unwrap();

    assert_eq!(summary.persisted, 1);
    assert_eq!(summary.malformed, 1);
    let job = store
        .get_job(&JobId::from_raw("glassdoor_a1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.visa_sponsorship, Some(true));
    assert!(job.skills.contains("airflow") && job.skills.contains("spark"));
}

#[cfg(feature = "sqlite")]
#[tokio::test]
async fn sqlite_store_backs_a_run() {
    use job_discovery::SqliteStore;

    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let orchestrator = Orchestrator::new(store.clone()).with_adapter(Arc::new(
        MockSource::new("indeed").with_records(vec![board_record("indeed", 1), board_record("indeed", 2)]),
    ));
    let config = PipelineConfig::new().with_source(SourceConfig::new("indeed"));

    orchestrator.run(&config).await.unwrap();
    orchestrator.run(&config).await.unwrap();

    assert_eq!(store.count().await.unwrap(), 2);
    assert_eq!(store.list_by_skill("python", 10).await.unwrap().len(), 2);
}

const REQUIRED: [(&str, &str); 5] = [
    ("id", "id"),
    ("title", "title"),
    ("company", "company"),
    ("link", "application_link"),
    ("posted_date", "posted_date"),
];

proptest! {
    #[test]
    fn missing_required_field_never_yields_a_job(present in proptest::collection::vec(any::<bool>(), 5)) {
        let values = ["42", "Data Engineer", "Acme", "https://acme.com/jobs/42", "2024-06-01"];
        let mut record = RawRecord::new().with_field("description", "Python and SQL");
        for (i, (key, _)) in REQUIRED.iter().enumerate() {
            if present[i] {
                record = record.with_field(*key, values[i]);
            }
        }

        let normalizer = Normalizer::new(&NormalizerConfig::default(), chrono::Duration::days(30)).unwrap();
        let result = normalizer.normalize(&record, &Source::Indeed, Utc::now());

        match present.iter().position(|p| !p) {
            None => prop_assert!(result.is_ok()),
            Some(missing) => prop_assert_eq!(
                result,
                Err(MalformedRecord::MissingField { field: REQUIRED[missing].1 })
            ),
        }
    }
}
