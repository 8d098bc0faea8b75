//! Configuration types for a pipeline run.
//!
//! Everything deserializes from JSON with defaults for omitted fields, so a
//! minimal config only needs its source list and filter criteria.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::pipeline::skills::fold_skill;
use crate::traits::store::MAX_BATCH_SIZE;

/// Longest retention window a run accepts.
pub const MAX_RETENTION_DAYS: i64 = 3650;

/// Data-engineering vocabulary used when none is configured.
pub const DEFAULT_SKILL_VOCABULARY: &[&str] = &[
    "python", "java", "sql", "t-sql", "pl/sql", "shell", "bash", "yaml", "c#", "c++",
    "javascript", "aws", "s3", "glue", "lambda", "step functions", "redshift", "ecs",
    "fargate", "ses", "sns", "eventbridge", "secrets manager", "cloudwatch", "rds", "ec2",
    "etl", "elt", "spark", "pyspark", "airflow", "kafka", "ssis", "ssrs", "data pipeline",
    "data warehouse", "sql server", "postgresql", "mysql", "oracle", "mongodb", "dynamodb",
    "nosql", "terraform", "docker", "kubernetes", "ci/cd", "github actions", "git", "jenkins",
    "spring", "hibernate", "flask", "rest api", "pandas", "sqlalchemy", "fastapi", "power bi",
    "tableau", "looker", "quicksight", "json", "parquet", "avro", "csv", "xml",
];

/// One configured source for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Origin tag stamped on every job from this source (e.g. "indeed")
    pub name: String,

    /// Registered adapter that serves this source. Defaults to `name`.
    #[serde(default)]
    pub adapter: Option<String>,

    /// Overrides the pipeline-wide per-source budget
    #[serde(default)]
    pub budget_ms: Option<u64>,

    /// Adapter-specific options (file path, endpoint, ...)
    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl SourceConfig {
    /// Create a config for a source served by the adapter of the same name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            adapter: None,
            budget_ms: None,
            options: HashMap::new(),
        }
    }

    /// Serve this source with a differently named adapter.
    pub fn with_adapter(mut self, adapter: impl Into<String>) -> Self {
        self.adapter = Some(adapter.into());
        self
    }

    /// Set a per-source time budget.
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget_ms = Some(budget.as_millis() as u64);
        self
    }

    /// Add an adapter option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Adapter registry key.
    pub fn adapter_name(&self) -> &str {
        self.adapter.as_deref().unwrap_or(&self.name)
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }
}

/// Skills a job is measured against.
///
/// A JSON array is a flat set (every skill weighs 1); a JSON object maps
/// skill to weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SkillCriteria {
    Flat(BTreeSet<String>),
    Weighted(BTreeMap<String, f64>),
}

impl Default for SkillCriteria {
    fn default() -> Self {
        SkillCriteria::Flat(BTreeSet::new())
    }
}

impl SkillCriteria {
    /// Flat criteria from any list of skills.
    pub fn flat(skills: impl IntoIterator<Item = impl Into<String>>) -> Self {
        SkillCriteria::Flat(skills.into_iter().map(Into::into).collect())
    }

    /// Weighted criteria from `(skill, weight)` pairs.
    pub fn weighted(skills: impl IntoIterator<Item = (impl Into<String>, f64)>) -> Self {
        SkillCriteria::Weighted(skills.into_iter().map(|(s, w)| (s.into(), w)).collect())
    }

    /// Folded skill → weight. Aliases that fold together keep the larger weight.
    pub fn folded_weights(&self) -> BTreeMap<String, f64> {
        let mut weights = BTreeMap::new();
        let pairs: Vec<(&str, f64)> = match self {
            SkillCriteria::Flat(set) => set.iter().map(|s| (s.as_str(), 1.0)).collect(),
            SkillCriteria::Weighted(map) => map.iter().map(|(s, w)| (s.as_str(), *w)).collect(),
        };
        for (skill, weight) in pairs {
            if let Some(folded) = fold_skill(skill) {
                let entry = weights.entry(folded).or_insert(weight);
                if weight > *entry {
                    *entry = weight;
                }
            }
        }
        weights
    }

    pub fn is_empty(&self) -> bool {
        match self {
            SkillCriteria::Flat(set) => set.is_empty(),
            SkillCriteria::Weighted(map) => map.is_empty(),
        }
    }
}

/// Acceptance criteria for the scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub skills: SkillCriteria,

    /// Minimum number of configured skills the job must mention
    pub min_skill_matches: usize,

    /// Annual USD floor; jobs without any salary data are not rejected by it
    pub min_salary: Option<i64>,

    /// Only accept jobs that confirm sponsorship
    pub require_visa: bool,

    /// Minimum match score in [0, 1]
    pub min_score: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            skills: SkillCriteria::default(),
            min_skill_matches: 0,
            min_salary: None,
            require_visa: false,
            min_score: 0.0,
        }
    }
}

impl FilterConfig {
    pub fn new(skills: SkillCriteria) -> Self {
        Self {
            skills,
            ..Default::default()
        }
    }

    pub fn with_min_skill_matches(mut self, min: usize) -> Self {
        self.min_skill_matches = min;
        self
    }

    pub fn with_min_salary(mut self, floor: i64) -> Self {
        self.min_salary = Some(floor);
        self
    }

    pub fn require_visa(mut self) -> Self {
        self.require_visa = true;
        self
    }

    pub fn with_min_score(mut self, score: f64) -> Self {
        self.min_score = score;
        self
    }
}

/// Bounded exponential backoff for persistence batches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per batch, including the first
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Timeout applied to each individual batch write
    pub attempt_timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
            attempt_timeout_ms: 10_000,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `retry` (1-based): `base * 2^(retry-1)`, capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(20);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}

/// Settings for the normalizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Skills recognized inside descriptions
    pub skill_vocabulary: Vec<String>,

    /// Scan descriptions for vocabulary skills
    pub extract_skills_from_description: bool,

    /// Units of USD per unit of currency
    pub currency_rates: BTreeMap<String, f64>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            skill_vocabulary: DEFAULT_SKILL_VOCABULARY
                .iter()
                .map(|s| s.to_string())
                .collect(),
            extract_skills_from_description: true,
            currency_rates: BTreeMap::from([("USD".to_string(), 1.0)]),
        }
    }
}

impl NormalizerConfig {
    pub fn with_vocabulary(mut self, skills: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.skill_vocabulary = skills.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_currency_rate(mut self, code: impl Into<String>, usd_per_unit: f64) -> Self {
        self.currency_rates
            .insert(code.into().to_uppercase(), usd_per_unit);
        self
    }

    pub fn without_description_skills(mut self) -> Self {
        self.extract_skills_from_description = false;
        self
    }
}

/// Everything one run needs, handed over by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub sources: Vec<SourceConfig>,

    /// Default time budget for each adapter call
    pub source_budget_ms: u64,

    /// How long a job is kept after it was scraped
    pub retention_days: i64,

    pub filter: FilterConfig,

    /// Jobs per persistence write, at most the store maximum
    pub batch_size: usize,

    /// Wall-clock bound on the source fan-out
    pub run_timeout_ms: u64,

    pub retry: RetryConfig,

    pub normalizer: NormalizerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            source_budget_ms: 30_000,
            retention_days: 30,
            filter: FilterConfig::default(),
            batch_size: MAX_BATCH_SIZE,
            run_timeout_ms: 300_000,
            retry: RetryConfig::default(),
            normalizer: NormalizerConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn with_source(mut self, source: SourceConfig) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_filter(mut self, filter: FilterConfig) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_source_budget(mut self, budget: Duration) -> Self {
        self.source_budget_ms = budget.as_millis() as u64;
        self
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_retention_days(mut self, days: i64) -> Self {
        self.retention_days = days;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_normalizer(mut self, normalizer: NormalizerConfig) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Budget for one source, honoring its override.
    pub fn budget_for(&self, source: &SourceConfig) -> Duration {
        Duration::from_millis(source.budget_ms.unwrap_or(self.source_budget_ms))
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_millis(self.run_timeout_ms)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.retention_days.clamp(0, MAX_RETENTION_DAYS))
    }

    /// Reject configurations a run cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(PipelineError::Config("no sources configured".into()));
        }
        if !(1..=MAX_RETENTION_DAYS).contains(&self.retention_days) {
            return Err(PipelineError::Config(format!(
                "retention_days must be between 1 and {MAX_RETENTION_DAYS}"
            )));
        }
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(PipelineError::Config(format!(
                "batch_size must be between 1 and {MAX_BATCH_SIZE}"
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(PipelineError::Config(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.filter.min_score) {
            return Err(PipelineError::Config(
                "filter.min_score must be within [0, 1]".into(),
            ));
        }
        if let SkillCriteria::Weighted(map) = &self.filter.skills {
            if map.values().any(|w| !w.is_finite() || *w < 0.0) {
                return Err(PipelineError::Config(
                    "skill weights must be finite and non-negative".into(),
                ));
            }
        }
        let mut seen = BTreeSet::new();
        for source in &self.sources {
            if source.name.trim().is_empty() {
                return Err(PipelineError::Config("source with empty name".into()));
            }
            if !seen.insert(source.name.to_lowercase()) {
                return Err(PipelineError::Config(format!(
                    "source {} configured twice",
                    source.name
                )));
            }
        }
        Ok(())
    }
}
