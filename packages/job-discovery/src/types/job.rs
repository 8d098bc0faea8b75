//! Canonical job record and its lifecycle.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Stable job identifier, `"{source}_{native_id}"`.
///
/// Derived once by the normalizer and never rewritten; it is the upsert key
/// of every store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Derive the id for a native id on a source.
    pub fn derive(source: &Source, native_id: &str) -> Self {
        Self(format!("{}_{}", source.as_str(), native_id.trim()))
    }

    /// Wrap an id that was already derived (e.g. read back from a store).
    pub fn from_raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Origin tag of a job record.
///
/// Known boards get their own variant; anything else is carried verbatim
/// (lower-cased) in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Source {
    Linkedin,
    Indeed,
    Glassdoor,
    ZipRecruiter,
    Other(String),
}

impl Source {
    pub fn as_str(&self) -> &str {
        match self {
            Source::Linkedin => "linkedin",
            Source::Indeed => "indeed",
            Source::Glassdoor => "glassdoor",
            Source::ZipRecruiter => "ziprecruiter",
            Source::Other(name) => name,
        }
    }
}

impl From<&str> for Source {
    fn from(name: &str) -> Self {
        let name = name.trim().to_lowercase();
        match name.as_str() {
            "linkedin" => Source::Linkedin,
            "indeed" => Source::Indeed,
            "glassdoor" => Source::Glassdoor,
            "ziprecruiter" | "zip_recruiter" => Source::ZipRecruiter,
            _ => Source::Other(name),
        }
    }
}

impl From<String> for Source {
    fn from(name: String) -> Self {
        Source::from(name.as_str())
    }
}

impl From<Source> for String {
    fn from(source: Source) -> Self {
        source.as_str().to_string()
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the work happens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkMode {
    Remote,
    #[default]
    Onsite,
    Hybrid,
}

impl WorkMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkMode::Remote => "remote",
            WorkMode::Onsite => "onsite",
            WorkMode::Hybrid => "hybrid",
        }
    }

    /// Parse the loose spellings boards use for work arrangements.
    pub fn parse_loose(value: &str) -> Option<Self> {
        let value = value.trim().to_lowercase();
        match value.as_str() {
            "remote" | "fully remote" | "work from home" | "wfh" | "telecommute" => {
                Some(WorkMode::Remote)
            }
            "onsite" | "on-site" | "on site" | "in office" | "in-office" | "office" => {
                Some(WorkMode::Onsite)
            }
            "hybrid" | "hybrid remote" => Some(WorkMode::Hybrid),
            _ => None,
        }
    }
}

impl fmt::Display for WorkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkMode::parse_loose(s).ok_or_else(|| format!("unknown work mode: {s}"))
    }
}

/// Application lifecycle of a stored job.
///
/// Status only moves forward: `New → Shortlisted → Applied → Interviewing →
/// Offered`, with `Rejected` and `Archived` reachable from any non-terminal
/// state. Forward skips are allowed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    New,
    Shortlisted,
    Applied,
    Interviewing,
    Offered,
    Rejected,
    Archived,
}

impl JobStatus {
    pub const ALL: [JobStatus; 7] = [
        JobStatus::New,
        JobStatus::Shortlisted,
        JobStatus::Applied,
        JobStatus::Interviewing,
        JobStatus::Offered,
        JobStatus::Rejected,
        JobStatus::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::New => "new",
            JobStatus::Shortlisted => "shortlisted",
            JobStatus::Applied => "applied",
            JobStatus::Interviewing => "interviewing",
            JobStatus::Offered => "offered",
            JobStatus::Rejected => "rejected",
            JobStatus::Archived => "archived",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Offered | JobStatus::Rejected | JobStatus::Archived
        )
    }

    /// Position on the main progression; exits share the last slot.
    fn stage(&self) -> u8 {
        match self {
            JobStatus::New => 0,
            JobStatus::Shortlisted => 1,
            JobStatus::Applied => 2,
            JobStatus::Interviewing => 3,
            JobStatus::Offered | JobStatus::Rejected | JobStatus::Archived => 4,
        }
    }

    /// Whether `self → to` is a legal forward move.
    pub fn can_transition_to(&self, to: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match to {
            JobStatus::Rejected | JobStatus::Archived => true,
            _ => to.stage() > self.stage(),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown job status: {s}"))
    }
}

/// Canonical, source-independent job posting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub source: Source,
    /// Native id as the source reported it
    pub source_id: String,
    pub company_name: String,
    pub title: String,
    pub location: String,
    pub work_mode: WorkMode,
    pub skills: BTreeSet<String>,
    /// Annual USD
    pub salary_min: Option<i64>,
    /// Annual USD
    pub salary_max: Option<i64>,
    /// `None` means unknown, which is not the same as `Some(false)`
    pub visa_sponsorship: Option<bool>,
    pub description: String,
    pub application_link: String,
    pub posted_date: NaiveDate,
    pub scraped_at: DateTime<Utc>,
    pub status: JobStatus,
    pub match_score: Option<f64>,
    pub expires_at: DateTime<Utc>,
}

impl Job {
    /// Salary figure compared against a floor: max if present, else min.
    pub fn salary_reference(&self) -> Option<i64> {
        self.salary_max.or(self.salary_min)
    }

    /// No salary data at all.
    pub fn salary_unspecified(&self) -> bool {
        self.salary_min.is_none() && self.salary_max.is_none()
    }

    /// Host of the application link, lower-cased.
    pub fn link_host(&self) -> Option<String> {
        url::Url::parse(&self.application_link)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_derivation() {
        let id = JobId::derive(&Source::Indeed, " 1a2b ");
        assert_eq!(id.as_str(), "indeed_1a2b");

        let other = JobId::derive(&Source::from("Dice"), "77");
        assert_eq!(other.as_str(), "dice_77");
    }

    #[test]
    fn test_source_round_trips_through_string() {
        assert_eq!(Source::from("LinkedIn"), Source::Linkedin);
        assert_eq!(Source::from("zip_recruiter"), Source::ZipRecruiter);
        assert_eq!(String::from(Source::Other("dice".into())), "dice");

        let json = serde_json::to_string(&Source::Indeed).unwrap();
        assert_eq!(json, "\"indeed\"");
    }

    #[test]
    fn test_status_moves_forward_only() {
        assert!(JobStatus::New.can_transition_to(JobStatus::Shortlisted));
        assert!(JobStatus::New.can_transition_to(JobStatus::Applied));
        assert!(JobStatus::Applied.can_transition_to(JobStatus::Rejected));
        assert!(JobStatus::Interviewing.can_transition_to(JobStatus::Offered));

        assert!(!JobStatus::Applied.can_transition_to(JobStatus::Shortlisted));
        assert!(!JobStatus::New.can_transition_to(JobStatus::New));
        assert!(!JobStatus::Offered.can_transition_to(JobStatus::Archived));
        assert!(!JobStatus::Rejected.can_transition_to(JobStatus::Applied));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("Interviewing".parse::<JobStatus>(), Ok(JobStatus::Interviewing));
        assert!("hired".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_work_mode_loose_parse() {
        assert_eq!(WorkMode::parse_loose("On-site"), Some(WorkMode::Onsite));
        assert_eq!(WorkMode::parse_loose("Work from home"), Some(WorkMode::Remote));
        assert_eq!(WorkMode::parse_loose("HYBRID"), Some(WorkMode::Hybrid));
        assert_eq!(WorkMode::parse_loose("mars"), None);
    }
}
