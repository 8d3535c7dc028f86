// Job Store Port (Interface)

use crate::domain::{CompletedJob, Job, JobId, NewJob, RunId};
use crate::error::Result;
use async_trait::async_trait;

/// Repository interface for the shared job table
///
/// Every mutation of a claimed job filters on its lock id, so only the run that
/// claimed a job can change it.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new, unlocked job with attempts = 0
    async fn insert(&self, job: &NewJob) -> Result<JobId>;

    /// Find job by ID
    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>>;

    /// Atomically lock every unlocked job for `run_id` and return them (ascending id)
    ///
    /// With `max_attempts` set, jobs that already reached it are left unclaimed.
    async fn claim_batch(&self, run_id: &RunId, max_attempts: Option<i32>) -> Result<Vec<Job>>;

    /// Restamp the claim of a job held by `run_id` with the current time
    ///
    /// Called before each delivery so the stale lock sweep only sees claims of
    /// runs that stopped making progress. Returns false if the claim was lost.
    async fn touch_claim(&self, id: JobId, run_id: &RunId) -> Result<bool>;

    /// Increment attempts and store the error of a job claimed by `run_id`
    ///
    /// Returns false if the job is no longer claimed by `run_id`.
    async fn record_failure(&self, id: JobId, run_id: &RunId, message: &str) -> Result<bool>;

    /// Clear the lock on every job still claimed by `run_id`
    async fn release_all(&self, run_id: &RunId) -> Result<u64>;

    /// Clear locks taken before `locked_before` (epoch ms), left by crashed runs
    async fn release_stale(&self, locked_before: i64) -> Result<u64>;

    /// Count jobs waiting for delivery (locked or not)
    async fn count_pending(&self) -> Result<i64>;

    /// Count jobs currently claimed by some run
    async fn count_locked(&self) -> Result<i64>;
}

/// Read side of the append-only audit log
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// All audit records for a job id (more than one after an at-least-once redelivery)
    async fn find_completed(&self, id: JobId) -> Result<Vec<CompletedJob>>;

    /// Count audit records
    async fn count_completed(&self) -> Result<i64>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use crate::port::time_provider::{SystemTimeProvider, TimeProvider};
    use crate::port::{JobStoreTransaction, Transaction, TransactionalJobStore};
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct State {
        jobs: BTreeMap<JobId, Job>,
        log: Vec<CompletedJob>,
        next_id: JobId,
        unreachable: bool,
        failing_commits: bool,
        failing_releases: bool,
    }

    impl State {
        fn check_reachable(&self) -> Result<()> {
            if self.unreachable {
                Err(AppError::Queue("job store unreachable".to_string()))
            } else {
                Ok(())
            }
        }
    }

    /// In-memory job store with switchable failure modes
    #[derive(Clone)]
    pub struct InMemoryJobStore {
        state: Arc<Mutex<State>>,
        time_provider: Arc<dyn TimeProvider>,
    }

    impl Default for InMemoryJobStore {
        fn default() -> Self {
            Self::new(Arc::new(SystemTimeProvider))
        }
    }

    impl InMemoryJobStore {
        pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
            Self {
                state: Arc::new(Mutex::new(State::default())),
                time_provider,
            }
        }

        /// Make every operation fail with a queue error
        pub fn set_unreachable(&self, unreachable: bool) {
            self.state.lock().unwrap().unreachable = unreachable;
        }

        /// Make transaction commits fail with a queue error
        pub fn set_failing_commits(&self, failing: bool) {
            self.state.lock().unwrap().failing_commits = failing;
        }

        /// Make `release_all` fail with a queue error
        pub fn set_failing_releases(&self, failing: bool) {
            self.state.lock().unwrap().failing_releases = failing;
        }

        /// Snapshot of the job table
        pub fn jobs(&self) -> Vec<Job> {
            self.state.lock().unwrap().jobs.values().cloned().collect()
        }

        /// Snapshot of the audit log
        pub fn completed(&self) -> Vec<CompletedJob> {
            self.state.lock().unwrap().log.clone()
        }

        /// Overwrite a stored job (e.g. to corrupt its value)
        pub fn put(&self, job: Job) {
            self.state.lock().unwrap().jobs.insert(job.id, job);
        }
    }

    #[async_trait]
    impl JobStore for InMemoryJobStore {
        async fn insert(&self, job: &NewJob) -> Result<JobId> {
            let mut state = self.state.lock().unwrap();
            state.check_reachable()?;
            state.next_id += 1;
            let id = state.next_id;
            state.jobs.insert(
                id,
                Job {
                    id,
                    application_id: job.application_id.clone(),
                    metric_name: job.metric_name.clone(),
                    value: job.value.clone(),
                    distinct_id: job.distinct_id.clone(),
                    created_at: job.created_at,
                    attempts: 0,
                    last_error: None,
                    lock_id: None,
                    locked_at: None,
                },
            );
            Ok(id)
        }

        async fn find_by_id(&self, id: JobId) -> Result<Option<Job>> {
            let state = self.state.lock().unwrap();
            state.check_reachable()?;
            Ok(state.jobs.get(&id).cloned())
        }

        async fn claim_batch(
            &self,
            run_id: &RunId,
            max_attempts: Option<i32>,
        ) -> Result<Vec<Job>> {
            let now = self.time_provider.now_millis();
            let mut state = self.state.lock().unwrap();
            state.check_reachable()?;
            let mut claimed = Vec::new();
            for job in state.jobs.values_mut() {
                let exhausted = max_attempts.is_some_and(|max| job.attempts >= max);
                if job.lock_id.is_none() && !exhausted {
                    job.lock_id = Some(run_id.clone());
                    job.locked_at = Some(now);
                    claimed.push(job.clone());
                }
            }
            Ok(claimed)
        }

        async fn touch_claim(&self, id: JobId, run_id: &RunId) -> Result<bool> {
            let now = self.time_provider.now_millis();
            let mut state = self.state.lock().unwrap();
            state.check_reachable()?;
            match state.jobs.get_mut(&id) {
                Some(job) if job.is_owned_by(run_id) => {
                    job.locked_at = Some(now);
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn record_failure(&self, id: JobId, run_id: &RunId, message: &str) -> Result<bool> {
            let mut state = self.state.lock().unwrap();
            state.check_reachable()?;
            match state.jobs.get_mut(&id) {
                Some(job) if job.is_owned_by(run_id) => {
                    job.attempts += 1;
                    job.last_error = Some(message.to_string());
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn release_all(&self, run_id: &RunId) -> Result<u64> {
            let mut state = self.state.lock().unwrap();
            state.check_reachable()?;
            if state.failing_releases {
                return Err(AppError::Queue("release failed".to_string()));
            }
            let mut released = 0;
            for job in state.jobs.values_mut().filter(|j| j.is_owned_by(run_id)) {
                job.lock_id = None;
                job.locked_at = None;
                released += 1;
            }
            Ok(released)
        }

        async fn release_stale(&self, locked_before: i64) -> Result<u64> {
            let mut state = self.state.lock().unwrap();
            state.check_reachable()?;
            let mut released = 0;
            for job in state.jobs.values_mut() {
                if job.lock_id.is_some() && job.locked_at.is_some_and(|t| t < locked_before) {
                    job.lock_id = None;
                    job.locked_at = None;
                    released += 1;
                }
            }
            Ok(released)
        }

        async fn count_pending(&self) -> Result<i64> {
            let state = self.state.lock().unwrap();
            state.check_reachable()?;
            Ok(state.jobs.len() as i64)
        }

        async fn count_locked(&self) -> Result<i64> {
            let state = self.state.lock().unwrap();
            state.check_reachable()?;
            Ok(state.jobs.values().filter(|j| j.is_locked()).count() as i64)
        }
    }

    #[async_trait]
    impl AuditLog for InMemoryJobStore {
        async fn find_completed(&self, id: JobId) -> Result<Vec<CompletedJob>> {
            let state = self.state.lock().unwrap();
            state.check_reachable()?;
            Ok(state.log.iter().filter(|r| r.id == id).cloned().collect())
        }

        async fn count_completed(&self) -> Result<i64> {
            let state = self.state.lock().unwrap();
            state.check_reachable()?;
            Ok(state.log.len() as i64)
        }
    }

    enum PendingOp {
        Append(CompletedJob),
        Delete(JobId),
    }

    /// Buffers writes until commit
    pub struct InMemoryTransaction {
        state: Arc<Mutex<State>>,
        ops: Vec<PendingOp>,
    }

    #[async_trait]
    impl TransactionalJobStore for InMemoryJobStore {
        async fn begin_transaction(&self) -> Result<Box<dyn JobStoreTransaction>> {
            self.state.lock().unwrap().check_reachable()?;
            Ok(Box::new(InMemoryTransaction {
                state: Arc::clone(&self.state),
                ops: Vec::new(),
            }))
        }
    }

    #[async_trait]
    impl Transaction for InMemoryTransaction {
        async fn commit(self: Box<Self>) -> Result<()> {
            let InMemoryTransaction { state, ops } = *self;
            let mut guard = state.lock().unwrap();
            guard.check_reachable()?;
            if guard.failing_commits {
                return Err(AppError::Queue("commit failed".to_string()));
            }
            for op in ops {
                match op {
                    PendingOp::Append(record) => guard.log.push(record),
                    PendingOp::Delete(id) => {
                        guard.jobs.remove(&id);
                    }
                }
            }
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl JobStoreTransaction for InMemoryTransaction {
        async fn append_completed(&mut self, record: &CompletedJob) -> Result<()> {
            self.ops.push(PendingOp::Append(record.clone()));
            Ok(())
        }

        async fn delete_claimed(&mut self, id: JobId, run_id: &RunId) -> Result<u64> {
            let owned = {
                let state = self.state.lock().unwrap();
                state.check_reachable()?;
                state.jobs.get(&id).is_some_and(|j| j.is_owned_by(run_id))
            };
            if owned {
                self.ops.push(PendingOp::Delete(id));
                Ok(1)
            } else {
                Ok(0)
            }
        }
    }
}
