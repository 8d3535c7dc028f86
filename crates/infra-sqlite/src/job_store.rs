// SQLite JobStore Implementation

use crate::error::map_sqlx_error;
use crate::SqliteJobTransaction;
use async_trait::async_trait;
use restful_metrics_core::domain::{CompletedJob, EncodedValue, Job, JobId, NewJob, RunId};
use restful_metrics_core::error::Result;
use restful_metrics_core::port::{
    AuditLog, JobStore, JobStoreTransaction, TimeProvider, TransactionalJobStore,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::debug;

pub struct SqliteJobStore {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn insert(&self, job: &NewJob) -> Result<JobId> {
        let id: JobId = sqlx::query_scalar(
            r#"
            INSERT INTO rm_job (
                application_id, metric_name, value, distinct_id, created_at
            ) VALUES (?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&job.application_id)
        .bind(&job.metric_name)
        .bind(job.value.as_str())
        .bind(&job.distinct_id)
        .bind(job.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(id)
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM rm_job WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(|r| r.into_job()))
    }

    async fn claim_batch(&self, run_id: &RunId, max_attempts: Option<i32>) -> Result<Vec<Job>> {
        // Single statement: two runs can never both set lock_id on the same row
        let now = self.time_provider.now_millis();

        let rows: Vec<JobRow> = sqlx::query_as(
            r#"
            UPDATE rm_job
            SET lock_id = ?, locked_at = ?
            WHERE lock_id IS NULL
              AND (? IS NULL OR attempts < ?)
            RETURNING *
            "#,
        )
        .bind(run_id.as_str())
        .bind(now)
        .bind(max_attempts)
        .bind(max_attempts)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        // RETURNING order is unspecified
        let mut jobs: Vec<Job> = rows.into_iter().map(|r| r.into_job()).collect();
        jobs.sort_by_key(|j| j.id);

        debug!(run_id = %run_id, claimed = jobs.len(), "Claimed jobs");
        Ok(jobs)
    }

    async fn touch_claim(&self, id: JobId, run_id: &RunId) -> Result<bool> {
        let result = sqlx::query("UPDATE rm_job SET locked_at = ? WHERE id = ? AND lock_id = ?")
            .bind(self.time_provider.now_millis())
            .bind(id)
            .bind(run_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_failure(&self, id: JobId, run_id: &RunId, message: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE rm_job
            SET attempts = attempts + 1, last_error = ?
            WHERE id = ? AND lock_id = ?
            "#,
        )
        .bind(message)
        .bind(id)
        .bind(run_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn release_all(&self, run_id: &RunId) -> Result<u64> {
        let result =
            sqlx::query("UPDATE rm_job SET lock_id = NULL, locked_at = NULL WHERE lock_id = ?")
                .bind(run_id.as_str())
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn release_stale(&self, locked_before: i64) -> Result<u64> {
        // Rows locked before migration 002 have no timestamp and are treated as stale
        let result = sqlx::query(
            r#"
            UPDATE rm_job
            SET lock_id = NULL, locked_at = NULL
            WHERE lock_id IS NOT NULL
              AND (locked_at IS NULL OR locked_at < ?)
            "#,
        )
        .bind(locked_before)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn count_pending(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM rm_job")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn count_locked(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM rm_job WHERE lock_id IS NOT NULL")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }
}

#[async_trait]
impl AuditLog for SqliteJobStore {
    async fn find_completed(&self, id: JobId) -> Result<Vec<CompletedJob>> {
        let rows: Vec<CompletedRow> =
            sqlx::query_as("SELECT * FROM rm_job_log WHERE id = ? ORDER BY sent_at ASC")
                .bind(id)
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(|r| r.into_completed()).collect())
    }

    async fn count_completed(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM rm_job_log")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }
}

#[async_trait]
impl TransactionalJobStore for SqliteJobStore {
    async fn begin_transaction(&self) -> Result<Box<dyn JobStoreTransaction>> {
        let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        Ok(Box::new(SqliteJobTransaction::new(tx)))
    }
}

/// SQLite row representation of `rm_job`
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: i64,
    application_id: String,
    metric_name: String,
    value: String,
    distinct_id: Option<String>,
    created_at: i64,
    attempts: i32,
    last_error: Option<String>,
    lock_id: Option<String>,
    locked_at: Option<i64>,
}

impl JobRow {
    fn into_job(self) -> Job {
        Job {
            id: self.id,
            application_id: self.application_id,
            metric_name: self.metric_name,
            value: EncodedValue::from_raw(self.value),
            distinct_id: self.distinct_id,
            created_at: self.created_at,
            attempts: self.attempts,
            last_error: self.last_error,
            lock_id: self.lock_id.map(RunId::new),
            locked_at: self.locked_at,
        }
    }
}

/// SQLite row representation of `rm_job_log`
#[derive(Debug, sqlx::FromRow)]
struct CompletedRow {
    id: i64,
    application_id: String,
    metric_name: String,
    value: String,
    distinct_id: Option<String>,
    created_at: i64,
    sent_at: i64,
}

impl CompletedRow {
    fn into_completed(self) -> CompletedJob {
        CompletedJob {
            id: self.id,
            application_id: self.application_id,
            metric_name: self.metric_name,
            value: EncodedValue::from_raw(self.value),
            distinct_id: self.distinct_id,
            created_at: self.created_at,
            sent_at: self.sent_at,
        }
    }
}
