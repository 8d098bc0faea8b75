//! Match scoring and acceptance filtering.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::config::FilterConfig;
use crate::types::job::Job;

/// Why a job was turned away.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    TooFewSkills { matched: usize, required: usize },
    SalaryBelowFloor { salary: i64, floor: i64 },
    VisaNotConfirmed,
    ScoreBelowMinimum { score: f64, minimum: f64 },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::TooFewSkills { matched, required } => {
                write!(f, "{matched} of {required} required skills")
            }
            RejectReason::SalaryBelowFloor { salary, floor } => {
                write!(f, "salary {salary} below floor {floor}")
            }
            RejectReason::VisaNotConfirmed => f.write_str("visa sponsorship not confirmed"),
            RejectReason::ScoreBelowMinimum { score, minimum } => {
                write!(f, "score {score:.2} below minimum {minimum:.2}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Accepted,
    Rejected(Vec<RejectReason>),
}

impl Decision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Decision::Accepted)
    }
}

/// A job with its match score filled in, plus the verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredJob {
    pub job: Job,
    pub matched_skills: usize,
    pub decision: Decision,
}

/// Scores jobs against one filter configuration.
///
/// Configured skills are folded once at construction so that "K8s" in the
/// config matches "kubernetes" on a job.
#[derive(Debug, Clone)]
pub struct Scorer {
    weights: BTreeMap<String, f64>,
    filter: FilterConfig,
}

impl Scorer {
    pub fn new(filter: &FilterConfig) -> Self {
        Self {
            weights: filter.skills.folded_weights(),
            filter: filter.clone(),
        }
    }

    /// Configured skills the job mentions.
    pub fn matched_skills(&self, job: &Job) -> usize {
        self.weights
            .keys()
            .filter(|skill| job.skills.contains(*skill))
            .count()
    }

    /// Score in [0, 1]: matched weight over total weight. Falls back to
    /// matched count over configured count when weights sum to zero.
    pub fn match_score(&self, job: &Job) -> f64 {
        let total: f64 = self.weights.values().sum();
        let score = if total > 0.0 {
            let matched: f64 = self
                .weights
                .iter()
                .filter(|(skill, _)| job.skills.contains(*skill))
                .map(|(_, weight)| weight)
                .sum();
            matched / total
        } else {
            self.matched_skills(job) as f64 / self.weights.len().max(1) as f64
        };
        if score.is_nan() {
            0.0
        } else {
            score.clamp(0.0, 1.0)
        }
    }

    pub fn score(&self, mut job: Job) -> ScoredJob {
        let score = self.match_score(&job);
        let matched = self.matched_skills(&job);
        job.match_score = Some(score);

        let mut reasons = Vec::new();
        if matched < self.filter.min_skill_matches {
            reasons.push(RejectReason::TooFewSkills {
                matched,
                required: self.filter.min_skill_matches,
            });
        }
        if let (Some(floor), Some(salary)) = (self.filter.min_salary, job.salary_reference()) {
            if salary < floor {
                reasons.push(RejectReason::SalaryBelowFloor { salary, floor });
            }
        }
        if self.filter.require_visa && job.visa_sponsorship != Some(true) {
            reasons.push(RejectReason::VisaNotConfirmed);
        }
        if score < self.filter.min_score {
            reasons.push(RejectReason::ScoreBelowMinimum {
                score,
                minimum: self.filter.min_score,
            });
        }

        let decision = if reasons.is_empty() {
            Decision::Accepted
        } else {
            debug!(
                id = %job.id,
                reasons = ?reasons,
                "Job rejected"
            );
            Decision::Rejected(reasons)
        };

        ScoredJob {
            job,
            matched_skills: matched,
            decision,
        }
    }
}
