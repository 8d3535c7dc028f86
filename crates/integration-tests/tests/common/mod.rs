// Shared setup for integration tests
#![allow(dead_code)]

use restful_metrics_core::application::JobRunner;
use restful_metrics_core::port::id_provider::ProcessRunIdProvider;
use restful_metrics_core::port::time_provider::SystemTimeProvider;
use restful_metrics_core::port::{MetricTransport, TimeProvider};
use restful_metrics_infra_sqlite::{create_pool, run_migrations, SqliteJobStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// File-backed database; the directory is removed when dropped
pub struct TestDb {
    _dir: TempDir,
    path: PathBuf,
}

impl TestDb {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.db");
        Self { _dir: dir, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a store with its own pool, as a separate process would
    pub async fn open_store(&self) -> Arc<SqliteJobStore> {
        self.open_store_with_clock(Arc::new(SystemTimeProvider)).await
    }

    pub async fn open_store_with_clock(
        &self,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Arc<SqliteJobStore> {
        let pool = create_pool(self.path.to_str().unwrap()).await.unwrap();
        run_migrations(&pool).await.unwrap();
        Arc::new(SqliteJobStore::new(pool, time_provider))
    }
}

pub fn runner(store: Arc<SqliteJobStore>, transport: Arc<dyn MetricTransport>) -> JobRunner {
    JobRunner::new(
        store.clone(),
        store,
        transport,
        Arc::new(ProcessRunIdProvider),
        Arc::new(SystemTimeProvider),
    )
}
