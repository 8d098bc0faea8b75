//! Run summary - the accumulator threaded through one pipeline run.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::job::{Job, JobId};

/// Stage of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Scheduled,
    SourcesRunning,
    Aggregated,
    Filtered,
    Persisted,
    Completed,
    PartiallyFailed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::PartiallyFailed)
    }

    /// Legal successor states.
    pub fn can_transition_to(&self, next: RunState) -> bool {
        matches!(
            (self, next),
            (RunState::Scheduled, RunState::SourcesRunning)
                | (RunState::SourcesRunning, RunState::Aggregated)
                | (RunState::SourcesRunning, RunState::PartiallyFailed)
                | (RunState::Aggregated, RunState::Filtered)
                | (RunState::Filtered, RunState::Persisted)
                | (RunState::Persisted, RunState::Completed)
                | (RunState::Persisted, RunState::PartiallyFailed)
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Scheduled => "scheduled",
            RunState::SourcesRunning => "sources_running",
            RunState::Aggregated => "aggregated",
            RunState::Filtered => "filtered",
            RunState::Persisted => "persisted",
            RunState::Completed => "completed",
            RunState::PartiallyFailed => "partially_failed",
        };
        f.write_str(name)
    }
}

/// How a source adapter failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterFailureKind {
    Timeout,
    Failure,
}

/// One source that produced no batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterFailure {
    pub source: String,
    pub kind: AdapterFailureKind,
    pub message: String,
}

/// Per-source record counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStats {
    pub records: usize,
    pub normalized: usize,
    pub malformed: usize,
}

/// One accepted job in the summary's ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopMatch {
    pub id: JobId,
    pub title: String,
    pub company_name: String,
    pub match_score: f64,
}

impl From<&Job> for TopMatch {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            title: job.title.clone(),
            company_name: job.company_name.clone(),
            match_score: job.match_score.unwrap_or(0.0),
        }
    }
}

/// Result of a run, handed to the caller and the notifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub state: RunState,
    /// Every state the run passed through, in order
    pub transitions: Vec<RunState>,

    /// Raw records received from all sources
    pub discovered: usize,
    pub malformed: usize,
    pub duplicates_merged: usize,
    pub rejected: usize,
    pub accepted: usize,
    pub persisted: usize,
    pub failed_to_persist: Vec<JobId>,

    pub adapter_failures: Vec<AdapterFailure>,
    /// Sources cut off by the run deadline or cancellation
    pub cancelled_sources: Vec<String>,
    pub per_source: BTreeMap<String, SourceStats>,
    pub top_matches: Vec<TopMatch>,
    /// Run-level failures: exhausted persistence batches, no usable source
    pub errors: Vec<String>,
}

impl RunSummary {
    /// Fresh accumulator in the `Scheduled` state.
    pub fn new() -> Self {
        Self {
            run_id: Uuid::now_v7(),
            started_at: Utc::now(),
            finished_at: None,
            state: RunState::Scheduled,
            transitions: vec![RunState::Scheduled],
            discovered: 0,
            malformed: 0,
            duplicates_merged: 0,
            rejected: 0,
            accepted: 0,
            persisted: 0,
            failed_to_persist: Vec::new(),
            adapter_failures: Vec::new(),
            cancelled_sources: Vec::new(),
            per_source: BTreeMap::new(),
            top_matches: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Move to `next`, recording it. Illegal moves are logged and ignored.
    pub fn transition(&mut self, next: RunState) {
        if !self.state.can_transition_to(next) {
            tracing::error!(run_id = %self.run_id, from = %self.state, to = %next, "Illegal run state transition");
            return;
        }
        tracing::info!(run_id = %self.run_id, from = %self.state, to = %next, "Run state transition");
        self.state = next;
        self.transitions.push(next);
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
    }

    pub fn is_completed(&self) -> bool {
        self.state == RunState::Completed
    }

    /// Nothing failed anywhere.
    pub fn is_clean(&self) -> bool {
        self.is_completed()
            && self.adapter_failures.is_empty()
            && self.failed_to_persist.is_empty()
            && self.malformed == 0
    }

    pub(crate) fn source_stats(&mut self, source: &str) -> &mut SourceStats {
        self.per_source.entry(source.to_string()).or_default()
    }
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::new()
    }
}
