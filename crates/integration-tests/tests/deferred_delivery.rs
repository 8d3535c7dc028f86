//! Deferred Delivery Tests
//!
//! add_metric in deferred mode -> SQLite job table -> JobRunner -> audit log

mod common;

use common::{runner, TestDb};
use restful_metrics_core::application::{JobFailure, MetricReceipt, MetricsClient, RetryPolicy};
use restful_metrics_core::domain::{EncodedValue, MetricValue, NewJob};
use restful_metrics_core::port::transport::mocks::{MockBehavior, MockTransport, SentMetric};
use restful_metrics_core::port::{AuditLog, JobStore};
use restful_metrics_core::{AppError, DeliveryMode, MetricsConfig};
use std::sync::Arc;

fn deferred_client(
    store: Arc<dyn JobStore>,
    transport: Arc<MockTransport>,
    application_id: &str,
) -> MetricsClient {
    let config = MetricsConfig::new("key", application_id).with_mode(DeliveryMode::Deferred);
    MetricsClient::new(config, transport).with_job_store(store)
}

/// Scenario: one deferred metric, delivered by the next run
#[tokio::test]
async fn test_deferred_metric_delivered_on_run() {
    let db = TestDb::new();
    let store = db.open_store().await;
    let transport = Arc::new(MockTransport::new_success());
    let client = deferred_client(store.clone(), transport.clone(), "app1");

    let receipt = client.add_metric("signups", 1i64, None).await.unwrap();
    let MetricReceipt::Queued(job_id) = receipt else {
        panic!("expected a queued receipt, got {:?}", receipt);
    };

    // Queued, nothing sent yet
    let job = store.find_by_id(job_id).await.unwrap().unwrap();
    assert_eq!(job.metric_name, "signups");
    assert_eq!(job.application_id, "app1");
    assert_eq!(job.attempts, 0);
    assert!(!job.is_locked());
    assert_eq!(transport.call_count(), 0);

    let mut runner = runner(store.clone(), transport.clone());
    let report = runner.run().await.unwrap();

    assert_eq!(report.claimed, 1);
    assert_eq!(report.delivered, 1);
    assert!(runner.errors().is_empty());
    assert!(runner.ensure_no_errors().is_ok());

    assert_eq!(store.count_pending().await.unwrap(), 0);
    let log = store.find_completed(job_id).await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].metric_name, "signups");
    assert_eq!(log[0].application_id, "app1");
    assert_eq!(log[0].value, job.value);
    assert_eq!(log[0].created_at, job.created_at);
    assert!(log[0].sent_at >= job.created_at);

    assert_eq!(
        transport.sent(),
        vec![SentMetric {
            application_id: "app1".to_string(),
            metric_name: "signups".to_string(),
            value: MetricValue::from(1i64),
            distinct_id: None,
        }]
    );
}

/// Scenario: the transport always fails, the job stays queued with its error
#[tokio::test]
async fn test_failed_delivery_is_recorded_on_job() {
    let db = TestDb::new();
    let store = db.open_store().await;
    let transport = Arc::new(MockTransport::new_fail("service down"));
    let client = deferred_client(store.clone(), transport.clone(), "app1");

    client.add_metric("signups", 1i64, None).await.unwrap();

    let mut runner = runner(store.clone(), transport.clone());
    let report = runner.run().await.unwrap();

    assert_eq!(report.delivered, 0);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(runner.errors(), ["service down".to_string()]);

    let jobs_left = store.count_pending().await.unwrap();
    assert_eq!(jobs_left, 1);
    let job = store
        .find_by_id(report.failed[0].job_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.attempts, 1);
    assert_eq!(job.last_error.as_deref(), Some("service down"));
    assert!(!job.is_locked());
    assert_eq!(store.count_completed().await.unwrap(), 0);

    let err = runner.ensure_no_errors().unwrap_err();
    assert!(matches!(err, AppError::JobsFailed(ref errors) if errors.len() == 1));
    assert_eq!(err.to_string(), "Errors running delayed jobs:\nservice down");
}

/// A failed job is retried by the next run and then leaves the queue
#[tokio::test]
async fn test_failed_job_retried_on_next_run() {
    let db = TestDb::new();
    let store = db.open_store().await;
    let transport = Arc::new(MockTransport::new_fail("timeout"));
    let client = deferred_client(store.clone(), transport.clone(), "app1");
    client.add_metric("signups", 1i64, None).await.unwrap();

    let mut runner = runner(store.clone(), transport.clone());
    runner.run().await.unwrap();

    transport.set_behavior(MockBehavior::Success);
    let report = runner.run().await.unwrap();

    assert_eq!(report.delivered, 1);
    assert!(runner.errors().is_empty());
    assert_eq!(store.count_pending().await.unwrap(), 0);
    assert_eq!(store.count_completed().await.unwrap(), 1);
}

/// Mixed batch: failures do not stop the rest of the batch
#[tokio::test]
async fn test_mixed_batch() {
    let db = TestDb::new();
    let store = db.open_store().await;
    let transport = Arc::new(MockTransport::new(MockBehavior::FailMetric {
        metric_name: "broken".to_string(),
        message: "rejected".to_string(),
    }));
    let client = deferred_client(store.clone(), transport.clone(), "app1");

    client.add_metric("first", 1i64, None).await.unwrap();
    client.add_metric("broken", 2i64, None).await.unwrap();
    client.add_metric("last", 3i64, None).await.unwrap();

    let mut runner = runner(store.clone(), transport.clone());
    let report = runner.run().await.unwrap();

    assert_eq!(report.claimed, 3);
    assert_eq!(report.delivered, 2);
    assert_eq!(runner.errors(), ["rejected".to_string()]);
    assert_eq!(store.count_pending().await.unwrap(), 1);
    assert_eq!(store.count_locked().await.unwrap(), 0);
    assert_eq!(store.count_completed().await.unwrap(), 2);

    // Delivered in insertion order
    let names: Vec<String> = transport.sent().into_iter().map(|s| s.metric_name).collect();
    assert_eq!(names, vec!["first", "broken", "last"]);
}

/// Compound values survive both the synchronous and the deferred path
#[tokio::test]
async fn test_compound_value_round_trip() {
    let compound = MetricValue::from(vec!["a", "b", "c"]);

    // Synchronous
    let sync_transport = Arc::new(MockTransport::new_success());
    let sync_client =
        MetricsClient::new(MetricsConfig::new("key", "app1"), sync_transport.clone());
    sync_client
        .add_metric("compound", vec!["a", "b", "c"], None)
        .await
        .unwrap();

    // Deferred
    let db = TestDb::new();
    let store = db.open_store().await;
    let transport = Arc::new(MockTransport::new_success());
    let client = deferred_client(store.clone(), transport.clone(), "app1");
    client
        .add_metric("compound", vec!["a", "b", "c"], None)
        .await
        .unwrap();
    runner(store.clone(), transport.clone()).run().await.unwrap();

    assert_eq!(sync_transport.sent()[0].value, compound);
    assert_eq!(transport.sent()[0].value, compound);
    assert!(transport.sent()[0].value.is_compound());
}

/// Re-running against an empty or fully delivered queue changes nothing
#[tokio::test]
async fn test_rerun_is_idempotent() {
    let db = TestDb::new();
    let store = db.open_store().await;
    let transport = Arc::new(MockTransport::new_success());
    let mut runner = runner(store.clone(), transport.clone());

    // Empty queue
    let report = runner.run().await.unwrap();
    assert_eq!(report.claimed, 0);
    assert!(runner.errors().is_empty());

    let client = deferred_client(store.clone(), transport.clone(), "app1");
    client.add_metric("signups", 1i64, None).await.unwrap();
    runner.run().await.unwrap();
    let completed = store.count_completed().await.unwrap();

    let report = runner.run().await.unwrap();
    assert_eq!(report.claimed, 0);
    assert!(runner.errors().is_empty());
    assert_eq!(store.count_completed().await.unwrap(), completed);
    assert_eq!(transport.call_count(), 1);
}

/// Each job is sent with the application id it was queued under
#[tokio::test]
async fn test_jobs_keep_their_application_id() {
    let db = TestDb::new();
    let store = db.open_store().await;
    let transport = Arc::new(MockTransport::new_success());

    deferred_client(store.clone(), transport.clone(), "app1")
        .add_metric("signups", 1i64, Some("user-1"))
        .await
        .unwrap();
    deferred_client(store.clone(), transport.clone(), "app2")
        .add_metric("signups", 2i64, None)
        .await
        .unwrap();

    runner(store.clone(), transport.clone()).run().await.unwrap();

    let sent = transport.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].application_id, "app1");
    assert_eq!(sent[0].distinct_id.as_deref(), Some("user-1"));
    assert_eq!(sent[1].application_id, "app2");
    assert_eq!(sent[1].distinct_id, None);
}

/// A stored value that no longer decodes fails only its own job
#[tokio::test]
async fn test_corrupt_value_is_job_failure() {
    let db = TestDb::new();
    let store = db.open_store().await;
    let transport = Arc::new(MockTransport::new_success());

    let corrupt = NewJob::new("app1", "broken", EncodedValue::from_raw("{not json"), None, 0);
    let corrupt_id = store.insert(&corrupt).await.unwrap();
    deferred_client(store.clone(), transport.clone(), "app1")
        .add_metric("fine", 1i64, None)
        .await
        .unwrap();

    let mut runner = runner(store.clone(), transport.clone());
    let report = runner.run().await.unwrap();

    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].job_id, corrupt_id);
    assert!(matches!(report.failed[0].failure, JobFailure::Decode(_)));
    assert_eq!(transport.call_count(), 1);

    let job = store.find_by_id(corrupt_id).await.unwrap().unwrap();
    assert_eq!(job.attempts, 1);
    assert!(job.last_error.is_some());
}

/// With a bounded policy exhausted jobs stay in the table but are no longer claimed
#[tokio::test]
async fn test_bounded_retry_skips_exhausted_jobs() {
    let db = TestDb::new();
    let store = db.open_store().await;
    let transport = Arc::new(MockTransport::new_fail("down"));
    deferred_client(store.clone(), transport.clone(), "app1")
        .add_metric("signups", 1i64, None)
        .await
        .unwrap();

    let mut runner =
        runner(store.clone(), transport.clone()).with_retry_policy(RetryPolicy::bounded(2));

    assert_eq!(runner.run().await.unwrap().claimed, 1);
    assert_eq!(runner.run().await.unwrap().claimed, 1);
    let report = runner.run().await.unwrap();

    assert_eq!(report.claimed, 0);
    assert!(runner.errors().is_empty());
    assert_eq!(transport.call_count(), 2);
    assert_eq!(store.count_pending().await.unwrap(), 1);
}
