// Transaction port for atomic operations

use crate::domain::{CompletedJob, JobId, RunId};
use crate::error::Result;
use async_trait::async_trait;

/// Transaction trait for atomic multi-step operations
#[async_trait]
pub trait Transaction: Send {
    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Transactional JobStore operations
#[async_trait]
pub trait TransactionalJobStore: Send + Sync {
    /// Begin a new transaction
    async fn begin_transaction(&self) -> Result<Box<dyn JobStoreTransaction>>;
}

/// Completion of a delivered job: audit insert, then delete, in one transaction
#[async_trait]
pub trait JobStoreTransaction: Transaction {
    /// Append a record to the audit log (within transaction)
    async fn append_completed(&mut self, record: &CompletedJob) -> Result<()>;

    /// Delete a job still claimed by `run_id` (within transaction)
    ///
    /// Returns the number of rows deleted: 0 means the claim was lost.
    async fn delete_claimed(&mut self, id: JobId, run_id: &RunId) -> Result<u64>;
}
