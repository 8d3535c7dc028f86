// SQLite Transaction Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use restful_metrics_core::domain::{CompletedJob, JobId, RunId};
use restful_metrics_core::error::Result;
use restful_metrics_core::port::{JobStoreTransaction, Transaction};
use sqlx::{Sqlite, Transaction as SqlxTransaction};

pub struct SqliteJobTransaction<'a> {
    tx: SqlxTransaction<'a, Sqlite>,
}

impl<'a> SqliteJobTransaction<'a> {
    pub fn new(tx: SqlxTransaction<'a, Sqlite>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl Transaction for SqliteJobTransaction<'_> {
    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.map_err(map_sqlx_error)?;
        Ok(())
    }
}

#[async_trait]
impl JobStoreTransaction for SqliteJobTransaction<'_> {
    async fn append_completed(&mut self, record: &CompletedJob) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO rm_job_log (
                id, application_id, metric_name, value, distinct_id, created_at, sent_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id)
        .bind(&record.application_id)
        .bind(&record.metric_name)
        .bind(record.value.as_str())
        .bind(&record.distinct_id)
        .bind(record.created_at)
        .bind(record.sent_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn delete_claimed(&mut self, id: JobId, run_id: &RunId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM rm_job WHERE id = ? AND lock_id = ?")
            .bind(id)
            .bind(run_id.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}
