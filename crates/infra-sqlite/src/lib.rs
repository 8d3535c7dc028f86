// RESTful Metrics Infrastructure - SQLite Adapter
// Implements: JobStore, AuditLog, TransactionalJobStore

mod connection;
mod error;
mod job_store;
mod migration;
mod transaction;

pub use connection::{create_pool, create_pool_with, PoolConfig};
pub use job_store::SqliteJobStore;
pub use migration::run_migrations;
pub use transaction::SqliteJobTransaction;

// Note: sqlx::Error conversion goes through error::map_sqlx_error
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
