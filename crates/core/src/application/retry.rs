// Retry policy for failed deliveries
use crate::domain::Job;
use tracing::warn;

/// Retry policy
///
/// Failed jobs stay in the job table and are picked up again by the next run.
/// The default is unbounded: a job is retried until it is delivered. With a
/// bound, jobs that used up their attempts are no longer claimed and remain in
/// the table with their last error for inspection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: Option<i32>,
}

impl RetryPolicy {
    /// Retry forever
    pub fn unbounded() -> Self {
        Self { max_attempts: None }
    }

    /// Stop claiming a job once it failed `max_attempts` times
    pub fn bounded(max_attempts: i32) -> Self {
        Self {
            max_attempts: Some(max_attempts.max(1)),
        }
    }

    pub fn max_attempts(&self) -> Option<i32> {
        self.max_attempts
    }

    /// True if a job with `attempts` failures will not be claimed again
    pub fn is_exhausted(&self, attempts: i32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }

    /// Log when the failure just recorded on `job` used up its last attempt
    pub fn note_failure(&self, job: &Job) {
        let attempts = job.attempts + 1;
        if self.is_exhausted(attempts) {
            warn!(
                job_id = %job.id,
                metric = %job.metric_name,
                attempts = %attempts,
                "Max delivery attempts reached, job will no longer be claimed"
            );
        }
    }
}
