//! Lock Recovery Tests
//!
//! A runner that dies mid-run leaves its jobs locked. The stale lock sweep
//! returns them to the queue once the recovery window has passed.

mod common;

use async_trait::async_trait;
use common::{runner, TestDb};
use restful_metrics_core::application::{
    shutdown_channel, JobRunner, PeriodicRunner, RecoveryService,
};
use restful_metrics_core::domain::{MetricValue, NewJob, RunId};
use restful_metrics_core::port::time_provider::mocks::ManualClock;
use restful_metrics_core::port::transport::mocks::MockTransport;
use restful_metrics_core::port::{AuditLog, DeliveryError, JobStore, MetricTransport};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const WINDOW_MS: i64 = 60_000;

fn new_job(name: &str) -> NewJob {
    NewJob::new("app1", name, MetricValue::from(1i64).encode().unwrap(), None, 0)
}

/// Crashed run: locks survive normal runs, the sweep frees them after the window
#[tokio::test]
async fn test_crashed_run_recovered_by_sweep() {
    let db = TestDb::new();
    let clock = Arc::new(ManualClock::new(10_000_000));
    let store = db.open_store_with_clock(clock.clone()).await;

    let job_id = store.insert(&new_job("signups")).await.unwrap();
    // Claimed by a run that never finishes
    store
        .claim_batch(&RunId::new("crashed-run"), None)
        .await
        .unwrap();

    let transport = Arc::new(MockTransport::new_success());
    let mut runner = runner(store.clone(), transport.clone());
    assert_eq!(runner.run().await.unwrap().claimed, 0);

    let recovery = RecoveryService::new(store.clone(), clock.clone(), Some(WINDOW_MS));

    // Inside the window nothing is released
    clock.advance(WINDOW_MS / 2);
    assert_eq!(recovery.release_stale_locks().await.unwrap(), 0);

    clock.advance(WINDOW_MS);
    assert_eq!(recovery.release_stale_locks().await.unwrap(), 1);

    let report = runner.run().await.unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(store.find_completed(job_id).await.unwrap().len(), 1);
    assert_eq!(store.count_pending().await.unwrap(), 0);
}

/// The sweep leaves fresh locks of live runs alone
#[tokio::test]
async fn test_sweep_keeps_recent_locks() {
    let db = TestDb::new();
    let clock = Arc::new(ManualClock::new(10_000_000));
    let store = db.open_store_with_clock(clock.clone()).await;

    store.insert(&new_job("old")).await.unwrap();
    store.claim_batch(&RunId::new("old-run"), None).await.unwrap();

    clock.advance(WINDOW_MS * 2);
    let fresh_id = store.insert(&new_job("fresh")).await.unwrap();
    let live = RunId::new("live-run");
    store.claim_batch(&live, None).await.unwrap();

    let recovery = RecoveryService::new(store.clone(), clock.clone(), Some(WINDOW_MS));
    assert_eq!(recovery.release_stale_locks().await.unwrap(), 1);

    let fresh = store.find_by_id(fresh_id).await.unwrap().unwrap();
    assert!(fresh.is_owned_by(&live));
    assert_eq!(store.count_locked().await.unwrap(), 1);
}

/// The periodic runner sweeps before each pass and stops on shutdown
#[tokio::test]
async fn test_periodic_runner_recovers_and_delivers() {
    let db = TestDb::new();
    let clock = Arc::new(ManualClock::new(10_000_000));
    let store = db.open_store_with_clock(clock.clone()).await;

    store.insert(&new_job("signups")).await.unwrap();
    store
        .claim_batch(&RunId::new("crashed-run"), None)
        .await
        .unwrap();
    clock.advance(WINDOW_MS + 1);

    let transport = Arc::new(MockTransport::new_success());
    let recovery = RecoveryService::new(store.clone(), clock.clone(), Some(WINDOW_MS));
    let mut periodic = PeriodicRunner::new(
        runner(store.clone(), transport.clone()),
        Duration::from_millis(20),
    )
    .with_recovery(recovery);

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let handle = tokio::spawn(async move { periodic.run(shutdown_rx).await });

    // Poll until the recovered job has been delivered
    for _ in 0..100 {
        if store.count_completed().await.unwrap() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    shutdown_tx.shutdown();
    handle.await.unwrap().unwrap();

    assert_eq!(store.count_completed().await.unwrap(), 1);
    assert_eq!(store.count_pending().await.unwrap(), 0);
    assert_eq!(transport.call_count(), 1);
}

/// Each send of the first runner takes ten minutes. Meanwhile a second
/// instance sweeps with the default window and runs, as `serve` would.
struct SlowTransport {
    clock: Arc<ManualClock>,
    other_recovery: RecoveryService,
    other_runner: tokio::sync::Mutex<JobRunner>,
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl MetricTransport for SlowTransport {
    async fn send(
        &self,
        _application_id: &str,
        metric_name: &str,
        _value: &MetricValue,
        _distinct_id: Option<&str>,
    ) -> Result<(), DeliveryError> {
        self.sent.lock().unwrap().push(metric_name.to_string());
        self.clock.advance(10 * 60 * 1000);

        self.other_recovery.release_stale_locks().await.unwrap();
        self.other_runner.lock().await.run().await.unwrap();
        Ok(())
    }
}

/// A live run slower than the recovery window still delivers every job once
#[tokio::test]
async fn test_slow_run_and_sweeping_instance_deliver_each_job_once() {
    let db = TestDb::new();
    let clock = Arc::new(ManualClock::new(10_000_000));
    let store = db.open_store_with_clock(clock.clone()).await;
    let other_store = db.open_store_with_clock(clock.clone()).await;

    let mut ids = Vec::new();
    for name in ["j1", "j2", "j3"] {
        ids.push(store.insert(&new_job(name)).await.unwrap());
    }

    let other_transport = Arc::new(MockTransport::new_success());
    let slow = Arc::new(SlowTransport {
        clock: clock.clone(),
        other_recovery: RecoveryService::new(other_store.clone(), clock.clone(), None),
        other_runner: tokio::sync::Mutex::new(runner(
            other_store.clone(),
            other_transport.clone(),
        )),
        sent: Mutex::new(Vec::new()),
    });

    let report = runner(store.clone(), slow.clone()).run().await.unwrap();

    assert_eq!(report.claimed, 3);
    assert_eq!(report.delivered, 2);
    assert_eq!(report.lost, 1);

    let slow_sent = slow.sent.lock().unwrap().clone();
    let other_sent: Vec<String> = other_transport
        .sent()
        .into_iter()
        .map(|m| m.metric_name)
        .collect();
    assert_eq!(slow_sent, ["j1", "j2"]);
    assert_eq!(other_sent, ["j3"]);

    for id in ids {
        assert_eq!(store.find_completed(id).await.unwrap().len(), 1);
    }
    assert_eq!(store.count_completed().await.unwrap(), 3);
    assert_eq!(store.count_pending().await.unwrap(), 0);
}
