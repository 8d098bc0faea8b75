//! Pipeline stages, in run order.
//!
//! - [`normalize`] - raw records into canonical jobs
//! - [`dedup`] - collapse duplicate postings
//! - [`score`] - match score and accept/reject
//! - [`persist`] - batched, retried store writes
//! - [`orchestrator`] - drives one run through all of the above

pub mod dedup;
pub mod normalize;
pub mod orchestrator;
pub mod persist;
pub mod score;
pub mod skills;

pub use dedup::{CrossSourceListing, DedupOutcome, Deduplicator, DuplicatePolicy, SameSourceListing};
pub use normalize::Normalizer;
pub use orchestrator::Orchestrator;
pub use persist::{BatchWriter, PersistOutcome};
pub use score::{Decision, RejectReason, ScoredJob, Scorer};
pub use skills::SkillMatcher;
