// Enqueue Use Case (deferred delivery)

use crate::domain::{JobId, MetricValue, NewJob};
use crate::error::Result;
use crate::port::{JobStore, TimeProvider};
use tracing::debug;

/// Enqueue request: one metric to be delivered later by a runner
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    pub application_id: String,
    pub metric_name: String,
    pub value: MetricValue,
    pub distinct_id: Option<String>,
}

/// Execute enqueue use case
///
/// Serializes the value and inserts a single unlocked job with attempts = 0.
/// No network call happens here.
///
/// # Arguments
///
/// * `job_store` - Job store
/// * `time_provider` - Time provider (injected for determinism)
/// * `req` - Enqueue request
pub async fn execute(
    job_store: &dyn JobStore,
    time_provider: &dyn TimeProvider,
    req: EnqueueRequest,
) -> Result<JobId> {
    let value = req.value.encode()?;

    let job = NewJob::new(
        req.application_id,
        req.metric_name,
        value,
        req.distinct_id,
        time_provider.now_millis(),
    );

    let job_id = job_store.insert(&job).await?;
    debug!(job_id = %job_id, metric = %job.metric_name, "Metric queued for delayed delivery");

    Ok(job_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::port::job_store::mocks::InMemoryJobStore;
    use crate::port::time_provider::mocks::ManualClock;

    #[tokio::test]
    async fn test_inserts_unlocked_job() {
        let store = InMemoryJobStore::default();
        let clock = ManualClock::new(42_000);

        let req = EnqueueRequest {
            application_id: "app1".to_string(),
            metric_name: "signups".to_string(),
            value: MetricValue::from(1i64),
            distinct_id: Some("user-1".to_string()),
        };
        let id = execute(&store, &clock, req).await.unwrap();

        let job = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(job.application_id, "app1");
        assert_eq!(job.value.as_str(), "1");
        assert_eq!(job.distinct_id.as_deref(), Some("user-1"));
        assert_eq!(job.created_at, 42_000);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.lock_id, None);
    }

    #[tokio::test]
    async fn test_unencodable_value_is_not_queued() {
        let store = InMemoryJobStore::default();
        let clock = ManualClock::new(0);

        let req = EnqueueRequest {
            application_id: "app1".to_string(),
            metric_name: "ratio".to_string(),
            value: MetricValue::from(f64::NAN),
            distinct_id: None,
        };
        let err = execute(&store, &clock, req).await.unwrap_err();

        assert!(matches!(err, AppError::Serialization(_)));
        assert!(store.jobs().is_empty());
    }
}
