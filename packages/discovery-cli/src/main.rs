//! `discover` - run the job discovery pipeline and manage stored jobs.
//!
//! ```text
//! discover run --config pipeline.json
//! discover list --status new --limit 20
//! discover list --skill airflow
//! discover advance indeed_1a2b applied
//! discover purge
//! ```

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use job_discovery::{
    HttpJsonSource, JobId, JobStatus, JobStore, JsonFileSource, Orchestrator, RunState,
    SqliteStore, TracingNotifier,
};
use tokio_util::sync::CancellationToken;

use crate::config::{init_tracing, load_pipeline_config, DEFAULT_DATABASE_URL};

#[derive(Parser)]
#[command(name = "discover", about = "Job discovery and ranking pipeline")]
struct Cli {
    /// SQLite database holding discovered jobs
    #[arg(long, env = "DATABASE_URL", default_value = DEFAULT_DATABASE_URL, global = true)]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute one pipeline run and print its summary as JSON
    Run {
        /// Pipeline configuration file (JSON)
        #[arg(long, env = "PIPELINE_CONFIG")]
        config: PathBuf,
    },
    /// List stored jobs by status or by skill
    List {
        #[arg(long, conflicts_with = "skill")]
        status: Option<JobStatus>,

        #[arg(long)]
        skill: Option<String>,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Move a stored job forward in its lifecycle
    Advance { id: String, status: JobStatus },
    /// Delete jobs past their retention window
    Purge,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let store = Arc::new(
        SqliteStore::new(&cli.database_url)
            .await
            .with_context(|| format!("Failed to open job store at {}", cli.database_url))?,
    );

    match cli.command {
        Command::Run { config } => run(store, &config).await,
        Command::List { status, skill, limit } => {
            let jobs = match skill {
                Some(skill) => store.list_by_skill(&skill, limit).await?,
                None => {
                    store
                        .list_by_status(status.unwrap_or_default(), limit)
                        .await?
                }
            };
            for job in jobs {
                println!("{}", serde_json::to_string(&job)?);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Advance { id, status } => {
            let job = store
                .transition_status(&JobId::from_raw(id), status)
                .await
                .context("Failed to advance job")?;
            tracing::info!(id = %job.id, status = %job.status, "Job advanced");
            Ok(ExitCode::SUCCESS)
        }
        Command::Purge => {
            let removed = store.purge_expired(chrono::Utc::now()).await?;
            tracing::info!(removed, "Purged expired jobs");
            println!("{removed}");
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run(store: Arc<SqliteStore>, config_path: &std::path::Path) -> Result<ExitCode> {
    let config = load_pipeline_config(config_path)?;

    let orchestrator = Orchestrator::new(store)
        .with_adapter(Arc::new(JsonFileSource::new()))
        .with_adapter(Arc::new(HttpJsonSource::new()))
        .with_notifier(Arc::new(TracingNotifier));

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling pending sources");
            on_signal.cancel();
        }
    });

    let summary = orchestrator
        .run_with_cancel(&config, cancel)
        .await
        .context("Pipeline run failed")?;

    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(match summary.state {
        RunState::Completed => ExitCode::SUCCESS,
        _ => ExitCode::from(2),
    })
}
