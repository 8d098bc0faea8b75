//! Configuration loading for the `discover` binary.

use std::path::Path;

use anyhow::{Context, Result};
use job_discovery::PipelineConfig;

/// Default SQLite database, created next to the working directory.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://jobs.db?mode=rwc";

/// Default log filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,job_discovery=debug,sqlx=warn";

/// Read and validate a pipeline config file.
pub fn load_pipeline_config(path: &Path) -> Result<PipelineConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read pipeline config {}", path.display()))?;
    let config = PipelineConfig::from_json(&text)
        .with_context(|| format!("Invalid pipeline config {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Pipeline config {} failed validation", path.display()))?;
    Ok(config)
}

/// Install the global tracing subscriber.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();
}
