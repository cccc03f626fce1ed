//! PostgreSQL job record store.
//!
//! One row per processing attempt, independent of the queue itself, used for
//! observability and idempotent status recovery. Rows are created by the
//! worker that dequeued the job (status `processing`), mutated only by that
//! worker, and terminal once `completed` or `failed`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use thiserror::Error;
use uuid::Uuid;

/// Idempotent schema bootstrap, executed statement by statement at startup.
const SCHEMA_SQL: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS job_records (
        id          BIGSERIAL PRIMARY KEY,
        job_id      UUID NOT NULL UNIQUE,
        pr_number   BIGINT NOT NULL,
        pr_title    VARCHAR(500),
        status      VARCHAR(50) NOT NULL DEFAULT 'queued',
        message     TEXT,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_job_records_pr_number ON job_records(pr_number)",
    "CREATE INDEX IF NOT EXISTS idx_job_records_status ON job_records(status)",
];

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection to the database failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(#[from] sqlx::Error),

    /// Record not found.
    #[error("Job record not found: {0}")]
    NotFound(Uuid),
}

/// Lifecycle status of a job record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Accepted by the producer, not yet claimed by a worker.
    Queued,
    /// Claimed by a worker, analysis in progress.
    Processing,
    /// Terminal: analysis finished.
    Completed,
    /// Terminal: processing faulted.
    Failed,
}

impl JobStatus {
    /// Returns the wire/database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Parses a database value; unknown values map to `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    /// Returns whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields needed to create a job record.
#[derive(Debug, Clone)]
pub struct NewJobRecord {
    /// Job identifier from the descriptor.
    pub job_id: Uuid,
    /// Pull request number.
    pub pr_number: u64,
    /// Pull request title.
    pub pr_title: String,
}

/// A durable job status row.
#[derive(Debug, Clone)]
pub struct JobRecord {
    /// Job identifier.
    pub job_id: Uuid,
    /// Pull request number.
    pub pr_number: u64,
    /// Pull request title.
    pub pr_title: Option<String>,
    /// Current lifecycle status.
    pub status: String,
    /// Free-form result or error message.
    pub message: Option<String>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

/// Durable job record persistence, the worker's seam to the store.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Creates a record with status `processing`.
    async fn insert_processing(&self, record: &NewJobRecord) -> Result<(), StoreError>;

    /// Transitions a record to `completed` with the given message.
    async fn mark_completed(&self, job_id: Uuid, message: &str) -> Result<(), StoreError>;

    /// Transitions a record to `failed` with the given message.
    async fn mark_failed(&self, job_id: Uuid, message: &str) -> Result<(), StoreError>;

    /// Lightweight readiness probe (`SELECT 1`).
    async fn probe_ready(&self) -> Result<(), StoreError>;
}

/// PostgreSQL-backed job record store.
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Creates a store with a lazily-established connection pool.
    ///
    /// No connection is attempted here; the readiness gate decides when the
    /// store is actually reachable.
    pub fn connect_lazy(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect_lazy(database_url)
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Creates a store from an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the schema if it does not exist yet.
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        for statement in SCHEMA_SQL {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!("job record schema ready");
        Ok(())
    }

    /// Fetches a record by job identifier, for observability.
    pub async fn get_record(&self, job_id: Uuid) -> Result<Option<JobRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT job_id, pr_number, pr_title, status, message, created_at, updated_at
            FROM job_records
            WHERE job_id = $1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| JobRecord {
            job_id: r.get("job_id"),
            pr_number: r.get::<i64, _>("pr_number") as u64,
            pr_title: r.get("pr_title"),
            status: r.get("status"),
            message: r.get("message"),
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
        }))
    }

    async fn set_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        message: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE job_records
            SET status = $2, message = $3, updated_at = NOW()
            WHERE job_id = $1
            "#,
        )
        .bind(job_id)
        .bind(status.as_str())
        .bind(message)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(job_id));
        }

        Ok(())
    }
}

#[async_trait]
impl JobStore for Database {
    async fn insert_processing(&self, record: &NewJobRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO job_records (job_id, pr_number, pr_title, status)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (job_id) DO UPDATE SET
                status = EXCLUDED.status,
                updated_at = NOW()
            "#,
        )
        .bind(record.job_id)
        .bind(record.pr_number as i64)
        .bind(&record.pr_title)
        .bind(JobStatus::Processing.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_completed(&self, job_id: Uuid, message: &str) -> Result<(), StoreError> {
        self.set_status(job_id, JobStatus::Completed, message).await
    }

    async fn mark_failed(&self, job_id: Uuid, message: &str) -> Result<(), StoreError> {
        self.set_status(job_id, JobStatus::Failed, message).await
    }

    async fn probe_ready(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
