// Job Domain Model

use crate::domain::metric::EncodedValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Job ID (store-assigned, insertion ordered)
pub type JobId = i64;

/// Run identifier, used as the lock token of one runner pass
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A job that has not been persisted yet (no id, never locked)
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub application_id: String,
    pub metric_name: String,
    pub value: EncodedValue,
    pub distinct_id: Option<String>,
    pub created_at: i64, // epoch ms
}

impl NewJob {
    /// Create a pending job
    ///
    /// # Arguments
    ///
    /// * `application_id` - Application the metric belongs to
    /// * `metric_name` - Metric name
    /// * `value` - Already-serialized metric value
    /// * `distinct_id` - Resolved distinct user id, if any
    /// * `created_at` - Creation timestamp in epoch ms (injected, not system time)
    pub fn new(
        application_id: impl Into<String>,
        metric_name: impl Into<String>,
        value: EncodedValue,
        distinct_id: Option<String>,
        created_at: i64,
    ) -> Self {
        Self {
            application_id: application_id.into(),
            metric_name: metric_name.into(),
            value,
            distinct_id,
            created_at,
        }
    }
}

/// Job Entity: one row of the job table
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub application_id: String,
    pub metric_name: String,
    pub value: EncodedValue,
    pub distinct_id: Option<String>,
    pub created_at: i64,

    // Delivery bookkeeping
    pub attempts: i32,
    pub last_error: Option<String>,

    // Claim: lock_id is None when the job is free for any runner
    pub lock_id: Option<RunId>,
    pub locked_at: Option<i64>,
}

impl Job {
    pub fn is_locked(&self) -> bool {
        self.lock_id.is_some()
    }

    /// True if this job is currently claimed by the given run
    pub fn is_owned_by(&self, run_id: &RunId) -> bool {
        self.lock_id.as_ref() == Some(run_id)
    }
}

/// Audit log entry for a delivered job. Append-only.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedJob {
    pub id: JobId,
    pub application_id: String,
    pub metric_name: String,
    pub value: EncodedValue,
    pub distinct_id: Option<String>,
    pub created_at: i64,
    pub sent_at: i64,
}

impl CompletedJob {
    /// Build the audit record of a job delivered at `sent_at`
    pub fn from_job(job: &Job, sent_at: i64) -> Self {
        Self {
            id: job.id,
            application_id: job.application_id.clone(),
            metric_name: job.metric_name.clone(),
            value: job.value.clone(),
            distinct_id: job.distinct_id.clone(),
            created_at: job.created_at,
            sent_at,
        }
    }
}
