//! Source adapter trait for pluggable job feeds.
//!
//! An adapter owns everything source-specific (rendering, selectors,
//! pagination, auth) and hands the pipeline an untyped batch of records.
//! The orchestrator enforces the time budget, so implementations may
//! simply await their I/O.
//!
//! # Usage
//!
//! ```rust,ignore
//! use job_discovery::{SourceAdapter, SourceConfig};
//!
//! let config = SourceConfig::new("indeed").with_option("path", "indeed.json");
//! let records = adapter.fetch(&config).await?;
//! ```

use async_trait::async_trait;

use crate::error::SourceResult;
use crate::types::{config::SourceConfig, raw::RawRecord};

/// Producer of raw job records for one or more sources.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Fetch the current batch of raw records for `config`.
    ///
    /// At-least-once is fine: records seen in earlier runs may come back and
    /// are folded by the deduplicator and the idempotent store.
    async fn fetch(&self, config: &SourceConfig) -> SourceResult<Vec<RawRecord>>;

    /// Registry key the orchestrator looks this adapter up by.
    fn name(&self) -> &str;
}
