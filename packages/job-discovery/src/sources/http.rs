//! Adapter that GETs a batch from an HTTP endpoint returning JSON.
//!
//! Options:
//! - `endpoint` (required) - URL to fetch
//! - `token_env` - name of an environment variable holding a bearer token

use async_trait::async_trait;
use tracing::debug;

use crate::error::{SourceError, SourceResult};
use crate::sources::extract_records;
use crate::traits::source::SourceAdapter;
use crate::types::{config::SourceConfig, raw::RawRecord};

/// Default registry name.
pub const HTTP_ADAPTER: &str = "http";

pub struct HttpJsonSource {
    client: reqwest::Client,
    name: String,
}

impl Default for HttpJsonSource {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpJsonSource {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// Use a preconfigured client (proxies, default headers, ...).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            name: HTTP_ADAPTER.to_string(),
        }
    }

    /// Register under a different adapter name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn endpoint(config: &SourceConfig) -> SourceResult<url::Url> {
        let endpoint = config.option("endpoint").ok_or_else(|| SourceError::MissingOption {
            source_name: config.name.clone(),
            option: "endpoint",
        })?;
        url::Url::parse(endpoint)
            .map_err(|e| SourceError::Other(format!("invalid endpoint {}: {}", endpoint, e)))
    }

    /// Bearer token from the env var named by `token_env`, if any.
    fn token(config: &SourceConfig) -> SourceResult<Option<String>> {
        match config.option("token_env") {
            None => Ok(None),
            Some(var) => std::env::var(var)
                .map(Some)
                .map_err(|_| SourceError::Other(format!("environment variable {} is not set", var))),
        }
    }
}

#[async_trait]
impl SourceAdapter for HttpJsonSource {
    async fn fetch(&self, config: &SourceConfig) -> SourceResult<Vec<RawRecord>> {
        let url = Self::endpoint(config)?;
        let token = Self::token(config)?;

        let mut request = self.client.get(url.clone());
        if let Some(token) = &token {
            request = request.bearer_auth(token);
        }
        let resp = request.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SourceError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let payload: serde_json::Value = resp.json().await?;
        let records = extract_records(payload)?;

        debug!(source = %config.name, url = %url, records = records.len(), "Fetched batch");
        Ok(records)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
