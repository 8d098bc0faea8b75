//! Source-independent data types.

pub mod config;
pub mod job;
pub mod raw;
pub mod summary;
