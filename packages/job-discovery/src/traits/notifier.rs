//! Hand-off point for run summaries.
//!
//! Delivery (email, chat, ...) lives outside the pipeline; the orchestrator
//! only passes the finished summary along.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::types::summary::{RunState, RunSummary};

/// Receiver of finished run summaries.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, summary: &RunSummary);
}

/// Notifier that writes the summary to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, summary: &RunSummary) {
        if summary.state == RunState::PartiallyFailed {
            warn!(
                run_id = %summary.run_id,
                adapter_failures = summary.adapter_failures.len(),
                failed_to_persist = summary.failed_to_persist.len(),
                "Run partially failed"
            );
        }
        info!(
            run_id = %summary.run_id,
            state = %summary.state,
            discovered = summary.discovered,
            malformed = summary.malformed,
            duplicates_merged = summary.duplicates_merged,
            rejected = summary.rejected,
            persisted = summary.persisted,
            "Run summary"
        );
        for top in &summary.top_matches {
            info!(
                id = %top.id,
                score = top.match_score,
                "{} at {}",
                top.title,
                top.company_name
            );
        }
    }
}
