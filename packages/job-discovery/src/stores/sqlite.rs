//! SQLite job store.
//!
//! Jobs live in `jobs`, their folded skills in `job_skills`. Secondary
//! indexes back the two read paths:
//! - `(status, posted_date)` for status listings
//! - `(skill, job_id)` for skill listings
//!
//! Timestamps are stored as Unix milliseconds and posted dates as
//! `YYYY-MM-DD`, so range comparisons work on the raw columns.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, Sqlite, Transaction};

use crate::error::{PipelineError, Result};
use crate::pipeline::skills::fold_skill;
use crate::traits::store::{check_batch_size, check_transition, BatchResult, JobStore};
use crate::types::job::{Job, JobId, JobStatus, Source, WorkMode};

const SKILL_SEPARATOR: char = '\u{1f}';

const JOB_COLUMNS: &str = r#"
    j.id, j.source, j.source_id, j.company_name, j.title, j.location, j.work_mode,
    j.salary_min, j.salary_max, j.visa_sponsorship, j.description, j.application_link,
    j.posted_date, j.scraped_at, j.expires_at, j.status, j.match_score,
    (SELECT GROUP_CONCAT(s.skill, char(31)) FROM job_skills s WHERE s.job_id = j.id) AS skills
"#;

/// SQLite-backed job store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (and migrate) the database at `database_url`.
    ///
    /// # Example URLs
    /// - `sqlite://jobs.db?mode=rwc` - file, created if missing
    /// - `sqlite::memory:` - ephemeral; use [`in_memory`](Self::in_memory)
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// In-memory database on a single connection, so every query sees the
    /// same data.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                source_id TEXT NOT NULL,
                company_name TEXT NOT NULL,
                title TEXT NOT NULL,
                location TEXT NOT NULL,
                work_mode TEXT NOT NULL,
                salary_min INTEGER,
                salary_max INTEGER,
                visa_sponsorship INTEGER,
                description TEXT NOT NULL,
                application_link TEXT NOT NULL,
                posted_date TEXT NOT NULL,
                scraped_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'new',
                match_score REAL
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_status_posted ON jobs(status, posted_date DESC);
            CREATE INDEX IF NOT EXISTS idx_jobs_expires_at ON jobs(expires_at);
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS job_skills (
                job_id TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
                skill TEXT NOT NULL,
                PRIMARY KEY (job_id, skill)
            );

            CREATE INDEX IF NOT EXISTS idx_job_skills_skill ON job_skills(skill, job_id);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn upsert_one(tx: &mut Transaction<'_, Sqlite>, job: &Job) -> Result<()> {
        // status is left out of the update so lifecycle progress survives re-ingestion
        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, source, source_id, company_name, title, location, work_mode,
                salary_min, salary_max, visa_sponsorship, description, application_link,
                posted_date, scraped_at, expires_at, status, match_score
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                source = excluded.source,
                source_id = excluded.source_id,
                company_name = excluded.company_name,
                title = excluded.title,
                location = excluded.location,
                work_mode = excluded.work_mode,
                salary_min = excluded.salary_min,
                salary_max = excluded.salary_max,
                visa_sponsorship = excluded.visa_sponsorship,
                description = excluded.description,
                application_link = excluded.application_link,
                posted_date = excluded.posted_date,
                scraped_at = excluded.scraped_at,
                expires_at = excluded.expires_at,
                match_score = excluded.match_score
            "#,
        )
        .bind(job.id.as_str())
        .bind(job.source.as_str())
        .bind(&job.source_id)
        .bind(&job.company_name)
        .bind(&job.title)
        .bind(&job.location)
        .bind(job.work_mode.as_str())
        .bind(job.salary_min)
        .bind(job.salary_max)
        .bind(job.visa_sponsorship)
        .bind(&job.description)
        .bind(&job.application_link)
        .bind(job.posted_date.format("%Y-%m-%d").to_string())
        .bind(job.scraped_at.timestamp_millis())
        .bind(job.expires_at.timestamp_millis())
        .bind(job.status.as_str())
        .bind(job.match_score)
        .execute(&mut **tx)
        .await?;

        sqlx::query("DELETE FROM job_skills WHERE job_id = ?")
            .bind(job.id.as_str())
            .execute(&mut **tx)
            .await?;

        for skill in &job.skills {
            sqlx::query("INSERT OR IGNORE INTO job_skills (job_id, skill) VALUES (?, ?)")
                .bind(job.id.as_str())
                .bind(skill)
                .execute(&mut **tx)
                .await?;
        }

        Ok(())
    }
}

#[derive(Debug, FromRow)]
struct JobRow {
    id: String,
    source: String,
    source_id: String,
    company_name: String,
    title: String,
    location: String,
    work_mode: String,
    salary_min: Option<i64>,
    salary_max: Option<i64>,
    visa_sponsorship: Option<bool>,
    description: String,
    application_link: String,
    posted_date: String,
    scraped_at: i64,
    expires_at: i64,
    status: String,
    match_score: Option<f64>,
    skills: Option<String>,
}

impl JobRow {
    fn into_job(self) -> Result<Job> {
        let posted_date = NaiveDate::parse_from_str(&self.posted_date, "%Y-%m-%d")
            .map_err(|e| PipelineError::storage(format!("Invalid posted date: {}", e)))?;
        let scraped_at = millis_to_utc(self.scraped_at)?;
        let expires_at = millis_to_utc(self.expires_at)?;
        let work_mode: WorkMode = self.work_mode.parse().map_err(PipelineError::storage)?;
        let status: JobStatus = self.status.parse().map_err(PipelineError::storage)?;

        Ok(Job {
            id: JobId::from_raw(self.id),
            source: Source::from(self.source.as_str()),
            source_id: self.source_id,
            company_name: self.company_name,
            title: self.title,
            location: self.location,
            work_mode,
            skills: self
                .skills
                .map(|s| s.split(SKILL_SEPARATOR).map(str::to_string).collect())
                .unwrap_or_default(),
            salary_min: self.salary_min,
            salary_max: self.salary_max,
            visa_sponsorship: self.visa_sponsorship,
            description: self.description,
            application_link: self.application_link,
            posted_date,
            scraped_at,
            expires_at,
            status,
            match_score: self.match_score,
        })
    }
}

fn millis_to_utc(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| PipelineError::storage(format!("Invalid timestamp: {}", millis)))
}

fn into_jobs(rows: Vec<JobRow>) -> Result<Vec<Job>> {
    rows.into_iter().map(JobRow::into_job).collect()
}

#[async_trait]
impl JobStore for SqliteStore {
    async fn upsert_batch(&self, jobs: &[Job]) -> Result<BatchResult> {
        check_batch_size(jobs)?;

        let mut tx = self.pool.begin().await?;
        for job in jobs {
            Self::upsert_one(&mut tx, job).await?;
        }
        tx.commit().await?;

        Ok(BatchResult::all_committed(jobs.len()))
    }

    async fn get_job(&self, id: &JobId) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs j WHERE j.id = ?"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(JobRow::into_job).transpose()
    }

    async fn list_by_status(&self, status: JobStatus, limit: usize) -> Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs j WHERE j.status = ? \
             ORDER BY j.posted_date DESC, j.id LIMIT ?"
        ))
        .bind(status.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        into_jobs(rows)
    }

    async fn list_by_skill(&self, skill: &str, limit: usize) -> Result<Vec<Job>> {
        let Some(skill) = fold_skill(skill) else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs j \
             JOIN job_skills k ON k.job_id = j.id \
             WHERE k.skill = ? \
             ORDER BY j.match_score IS NULL, j.match_score DESC, j.id LIMIT ?"
        ))
        .bind(skill)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        into_jobs(rows)
    }

    async fn transition_status(&self, id: &JobId, to: JobStatus) -> Result<Job> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs j WHERE j.id = ?"
        ))
        .bind(id.as_str())
        .fetch_optional(&mut *tx)
        .await?;
        let mut job = row
            .map(JobRow::into_job)
            .transpose()?
            .ok_or_else(|| PipelineError::JobNotFound(id.clone()))?;

        check_transition(&job, to)?;

        sqlx::query("UPDATE jobs SET status = ? WHERE id = ?")
            .bind(to.as_str())
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        job.status = to;
        Ok(job)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = now.timestamp_millis();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM job_skills WHERE job_id IN (SELECT id FROM jobs WHERE expires_at <= ?)",
        )
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM jobs WHERE expires_at <= ?")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(result.rows_affected() as usize)
    }

    async fn count(&self) -> Result<usize> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM jobs")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0 as usize)
    }
}
