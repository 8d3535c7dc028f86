// Job Runner - delayed job delivery

pub mod constants;
mod periodic;
mod shutdown;

pub use periodic::PeriodicRunner;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::retry::RetryPolicy;
use crate::domain::{CompletedJob, Job, JobId, RunId};
use crate::error::{AppError, Result};
use crate::port::{
    DeliveryError, JobStore, MetricTransport, RunIdProvider, TimeProvider, TransactionalJobStore,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Failure of a single job. Recorded on the job, never aborts the run.
#[derive(Error, Debug)]
pub enum JobFailure {
    #[error("Invalid stored metric value: {0}")]
    Decode(#[source] serde_json::Error),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// A job that failed during a run
#[derive(Debug)]
pub struct FailedJob {
    pub job_id: JobId,
    pub failure: JobFailure,
}

/// Outcome of one runner pass
#[derive(Debug)]
pub struct RunReport {
    pub run_id: RunId,
    pub claimed: usize,
    pub delivered: usize,
    pub failed: Vec<FailedJob>,
    /// Claimed jobs skipped because the stale lock sweep took them back
    pub lost: usize,
    pub released: u64,
}

impl RunReport {
    fn new(run_id: RunId, claimed: usize) -> Self {
        Self {
            run_id,
            claimed,
            delivered: 0,
            failed: Vec::new(),
            lost: 0,
            released: 0,
        }
    }

    /// True if every claimed job was delivered
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runner claims a batch of jobs and delivers them one at a time
///
/// Several runners, in this process or others, may share one job store: the
/// claim is the only coordination between them.
pub struct JobRunner {
    job_store: Arc<dyn JobStore>,
    tx_store: Arc<dyn TransactionalJobStore>,
    transport: Arc<dyn MetricTransport>,
    run_ids: Arc<dyn RunIdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    retry_policy: RetryPolicy,
    errors: Vec<String>,
}

impl JobRunner {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        tx_store: Arc<dyn TransactionalJobStore>,
        transport: Arc<dyn MetricTransport>,
        run_ids: Arc<dyn RunIdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            job_store,
            tx_store,
            transport,
            run_ids,
            time_provider,
            retry_policy: RetryPolicy::unbounded(),
            errors: Vec::new(),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Error messages of the most recent run, in job order
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Fail with one aggregate error if the most recent run had job failures
    pub fn ensure_no_errors(&self) -> Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::JobsFailed(self.errors.clone()))
        }
    }

    /// Run one pass over the queue
    ///
    /// Claims every unlocked job, delivers each in turn, moves delivered jobs to
    /// the audit log, records failures on the job, then releases the claim.
    /// Each claim is restamped right before its delivery; a job whose claim was
    /// swept in the meantime belongs to another run now and is skipped.
    ///
    /// # Errors
    /// Only job store errors (`AppError::Queue`) are returned, immediately and
    /// without releasing the claim: without the store the runner cannot account
    /// for job state. The stale lock sweep frees such jobs later.
    pub async fn run(&mut self) -> Result<RunReport> {
        self.errors.clear();
        let run_id = self.run_ids.generate_run_id();

        let jobs = self
            .job_store
            .claim_batch(&run_id, self.retry_policy.max_attempts())
            .await?;
        info!(run_id = %run_id, claimed = jobs.len(), "Claimed job batch");

        let mut report = RunReport::new(run_id.clone(), jobs.len());

        for job in &jobs {
            if !self.job_store.touch_claim(job.id, &run_id).await? {
                warn!(run_id = %run_id, job_id = %job.id, "Job claim lost before delivery, skipping");
                report.lost += 1;
                continue;
            }

            match self.deliver(job).await {
                Ok(()) => {
                    self.complete(job, &run_id).await?;
                    report.delivered += 1;
                }
                Err(failure) => {
                    let message = failure.to_string();
                    warn!(
                        run_id = %run_id,
                        job_id = %job.id,
                        metric = %job.metric_name,
                        attempt = job.attempts + 1,
                        error = %message,
                        "Job delivery failed"
                    );

                    let owned = self
                        .job_store
                        .record_failure(job.id, &run_id, &message)
                        .await?;
                    if owned {
                        self.retry_policy.note_failure(job);
                    } else {
                        warn!(run_id = %run_id, job_id = %job.id, "Job claim lost before failure was recorded");
                    }

                    self.errors.push(message);
                    report.failed.push(FailedJob {
                        job_id: job.id,
                        failure,
                    });
                }
            }
        }

        report.released = self.job_store.release_all(&run_id).await?;

        info!(
            run_id = %run_id,
            claimed = report.claimed,
            delivered = report.delivered,
            failed = report.failed.len(),
            lost = report.lost,
            released = report.released,
            "Run finished"
        );
        Ok(report)
    }

    /// Decode and send one job with its own application id
    async fn deliver(&self, job: &Job) -> std::result::Result<(), JobFailure> {
        let value = job.value.decode().map_err(JobFailure::Decode)?;

        debug!(job_id = %job.id, application_id = %job.application_id, metric = %job.metric_name, "Sending job");
        self.transport
            .send(
                &job.application_id,
                &job.metric_name,
                &value,
                job.distinct_id.as_deref(),
            )
            .await?;
        Ok(())
    }

    /// Move a delivered job to the audit log: insert first, then delete
    async fn complete(&self, job: &Job, run_id: &RunId) -> Result<()> {
        let record = CompletedJob::from_job(job, self.time_provider.now_millis());

        let mut tx = self.tx_store.begin_transaction().await?;
        tx.append_completed(&record).await?;
        let deleted = tx.delete_claimed(job.id, run_id).await?;
        tx.commit().await?;

        if deleted == 0 {
            // Claim was swept during this single send; another run may send it again
            warn!(run_id = %run_id, job_id = %job.id, "Delivered job was no longer claimed by this run");
        } else {
            info!(run_id = %run_id, job_id = %job.id, metric = %job.metric_name, "Job delivered");
        }
        Ok(())
    }
}
