//! Adapter that reads a batch from a JSON file on disk.
//!
//! Useful for replaying scraper output: point the source's `path` option at
//! the file a scraper wrote.

use async_trait::async_trait;
use tracing::debug;

use crate::error::{SourceError, SourceResult};
use crate::sources::extract_records;
use crate::traits::source::SourceAdapter;
use crate::types::{config::SourceConfig, raw::RawRecord};

/// Default registry name.
pub const JSON_FILE_ADAPTER: &str = "json_file";

/// Reads `options.path` as a JSON array (or enveloped array) of records.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    name: String,
}

impl Default for JsonFileSource {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonFileSource {
    pub fn new() -> Self {
        Self::named(JSON_FILE_ADAPTER)
    }

    /// Register under a different adapter name.
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl SourceAdapter for JsonFileSource {
    async fn fetch(&self, config: &SourceConfig) -> SourceResult<Vec<RawRecord>> {
        let path = config.option("path").ok_or_else(|| SourceError::MissingOption {
            source_name: config.name.clone(),
            option: "path",
        })?;

        let text = tokio::fs::read_to_string(path).await?;
        let payload: serde_json::Value = serde_json::from_str(&text)?;
        let records = extract_records(payload)?;

        debug!(source = %config.name, path, records = records.len(), "Read batch file");
        Ok(records)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
