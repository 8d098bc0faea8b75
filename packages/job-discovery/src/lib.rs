//! Job Discovery & Ranking Pipeline
//!
//! Pulls job postings from several boards concurrently, normalizes them into
//! one canonical shape, collapses duplicates, scores each posting against a
//! skill profile and persists the accepted ones idempotently.
//!
//! # Design
//!
//! - Sources are isolated: a slow or failing board costs its own records,
//!   never the run
//! - Every stage after the fan-out is a plain function over the batch
//! - Writes are upserts keyed by a deterministic id, so re-running is safe
//! - The run outcome is data ([`RunSummary`]), not an error
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use job_discovery::{Orchestrator, PipelineConfig, SourceConfig, MemoryStore};
//! use job_discovery::sources::JsonFileSource;
//!
//! let config = PipelineConfig::new().with_source(
//!     SourceConfig::new("indeed")
//!         .with_adapter("json_file")
//!         .with_option("path", "indeed.json"),
//! );
//!
//! let orchestrator = Orchestrator::new(Arc::new(MemoryStore::new()))
//!     .with_adapter(Arc::new(JsonFileSource::new()));
//!
//! let summary = orchestrator.run(&config).await?;
//! println!("{} accepted, {} persisted", summary.accepted, summary.persisted);
//! ```
//!
//! # Modules
//!
//! - [`types`] - Canonical job, raw record, configuration and run summary
//! - [`traits`] - Seams: source adapters, job store, notifier
//! - [`pipeline`] - Normalizer, deduplicator, scorer, batch writer, orchestrator
//! - [`stores`] - Job store implementations (MemoryStore, SqliteStore)
//! - [`sources`] - Source adapters (JSON file, HTTP)
//! - [`testing`] - Mock implementations for testing

pub mod error;
pub mod pipeline;
pub mod sources;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{MalformedRecord, PipelineError, Result, SourceError, SourceResult};
pub use traits::{
    notifier::{Notifier, TracingNotifier},
    source::SourceAdapter,
    store::{BatchResult, JobStore, MAX_BATCH_SIZE},
};
pub use types::{
    config::{
        FilterConfig, NormalizerConfig, PipelineConfig, RetryConfig, SkillCriteria, SourceConfig,
        DEFAULT_SKILL_VOCABULARY, MAX_RETENTION_DAYS,
    },
    job::{Job, JobId, JobStatus, Source, WorkMode},
    raw::RawRecord,
    summary::{AdapterFailure, AdapterFailureKind, RunState, RunSummary, SourceStats, TopMatch},
};

// Re-export pipeline components
pub use pipeline::{
    BatchWriter, CrossSourceListing, Decision, DedupOutcome, Deduplicator, DuplicatePolicy,
    Normalizer, Orchestrator, PersistOutcome, RejectReason, SameSourceListing, ScoredJob, Scorer,
    SkillMatcher,
};

// Re-export stores
pub use stores::MemoryStore;

#[cfg(feature = "sqlite")]
pub use stores::SqliteStore;

// Re-export sources
pub use sources::{HttpJsonSource, JsonFileSource};

// Re-export testing utilities
pub use testing::{FlakyStore, JobFixture, MockSource, RecordingNotifier};
