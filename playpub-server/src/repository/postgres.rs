//! PostgreSQL job store
//!
//! Builds are persisted in `builds`, their logs in `build_logs` keyed by a
//! per-build sequence number. Transitions lock the build row with
//! `SELECT ... FOR UPDATE`, so writers for the same build are serialized
//! across connections.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use playpub_core::domain::build::{BuildJob, BuildStatus, Transition};
use playpub_core::domain::config::BuildConfig;
use playpub_core::domain::log::LogEntry;
use playpub_core::dto::build::BuildSummary;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{JobStore, StoreError, StoreResult};

#[derive(Debug, Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_logs<'e, E>(executor: E, id: Uuid) -> StoreResult<Vec<LogEntry>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let rows = sqlx::query_as::<_, LogRow>(
            r#"
            SELECT timestamp, message
            FROM build_logs
            WHERE build_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(id)
        .fetch_all(executor)
        .await?;

        Ok(rows.into_iter().map(LogEntry::from).collect())
    }

    async fn append_logs(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        first_seq: usize,
        entries: &[LogEntry],
    ) -> StoreResult<()> {
        for (offset, entry) in entries.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO build_logs (build_id, seq, timestamp, message)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(id)
            .bind((first_seq + offset) as i32)
            .bind(entry.timestamp)
            .bind(&entry.message)
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert(&self, job: BuildJob) -> StoreResult<()> {
        let config = serde_json::to_value(&job.config).map_err(|e| StoreError::Corrupt {
            id: job.id,
            reason: e.to_string(),
        })?;

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO builds (id, status, progress, error, output_ref, config,
                                start_time, started_at, finished_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(job.id)
        .bind(job.status.as_str())
        .bind(job.progress as i16)
        .bind(&job.error)
        .bind(&job.output_ref)
        .bind(config)
        .bind(job.start_time)
        .bind(job.started_at)
        .bind(job.finished_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists(job.id));
        }

        Self::append_logs(&mut tx, job.id, 0, &job.logs).await?;
        tx.commit().await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<BuildJob>> {
        let row = sqlx::query_as::<_, BuildRow>(
            r#"
            SELECT id, status, progress, error, output_ref, config,
                   start_time, started_at, finished_at
            FROM builds
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let logs = Self::load_logs(&self.pool, id).await?;
        row.into_job(logs).map(Some)
    }

    async fn list(&self) -> StoreResult<Vec<BuildSummary>> {
        let rows = sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT id, status, progress, start_time,
                   COALESCE(config->>'appName', '') AS app_name
            FROM builds
            ORDER BY start_time DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SummaryRow::into_summary).collect()
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM builds WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn apply(&self, id: Uuid, transition: Transition) -> StoreResult<BuildJob> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, BuildRow>(
            r#"
            SELECT id, status, progress, error, output_ref, config,
                   start_time, started_at, finished_at
            FROM builds
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound(id))?;

        let logs = Self::load_logs(&mut *tx, id).await?;
        let mut job = row.into_job(logs)?;
        let known_logs = job.logs.len();

        job.apply(transition, Utc::now())?;

        sqlx::query(
            r#"
            UPDATE builds
            SET status = $1, progress = $2, error = $3, output_ref = $4,
                started_at = $5, finished_at = $6
            WHERE id = $7
            "#,
        )
        .bind(job.status.as_str())
        .bind(job.progress as i16)
        .bind(&job.error)
        .bind(&job.output_ref)
        .bind(job.started_at)
        .bind(job.finished_at)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        Self::append_logs(&mut tx, id, known_logs, &job.logs[known_logs..]).await?;
        tx.commit().await?;

        Ok(job)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn parse_status(id: Uuid, status: &str) -> StoreResult<BuildStatus> {
    status
        .parse::<BuildStatus>()
        .map_err(|reason| StoreError::Corrupt { id, reason })
}

fn parse_progress(id: Uuid, progress: i16) -> StoreResult<u8> {
    u8::try_from(progress).map_err(|_| StoreError::Corrupt {
        id,
        reason: format!("progress out of range: {}", progress),
    })
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct BuildRow {
    id: Uuid,
    status: String,
    progress: i16,
    error: Option<String>,
    output_ref: Option<String>,
    config: serde_json::Value,
    start_time: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl BuildRow {
    fn into_job(self, logs: Vec<LogEntry>) -> StoreResult<BuildJob> {
        let id = self.id;
        let config: BuildConfig =
            serde_json::from_value(self.config).map_err(|e| StoreError::Corrupt {
                id,
                reason: format!("invalid config: {}", e),
            })?;

        Ok(BuildJob {
            id,
            status: parse_status(id, &self.status)?,
            progress: parse_progress(id, self.progress)?,
            logs,
            error: self.error,
            output_ref: self.output_ref,
            config,
            start_time: self.start_time,
            started_at: self.started_at,
            finished_at: self.finished_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    id: Uuid,
    status: String,
    progress: i16,
    start_time: DateTime<Utc>,
    app_name: String,
}

impl SummaryRow {
    fn into_summary(self) -> StoreResult<BuildSummary> {
        Ok(BuildSummary {
            id: self.id,
            status: parse_status(self.id, &self.status)?,
            progress: parse_progress(self.id, self.progress)?,
            start_time: self.start_time,
            app_name: self.app_name,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LogRow {
    timestamp: DateTime<Utc>,
    message: String,
}

impl From<LogRow> for LogEntry {
    fn from(row: LogRow) -> Self {
        LogEntry::new(row.message, row.timestamp)
    }
}
