//! Core trait abstractions for the pipeline.
//!
//! These are the seams to external collaborators: job feeds, the durable
//! store, and whoever receives run summaries.

pub mod notifier;
pub mod source;
pub mod store;
