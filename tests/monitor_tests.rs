//! Queue monitor behaviour against the in-memory queues.

mod common;

use common::*;
use exchange_set_core::config::PollMode;
use exchange_set_core::messaging::{BuildRequest, BuildResponse, MessagingService};
use exchange_set_core::models::{BatchId, DataStandard, ExchangeSetRequest, JobId};
use exchange_set_core::orchestration::QueueMonitor;
use exchange_set_core::state_machine::StatePair;
use std::time::Duration;
use tokio::sync::watch;

fn request() -> ExchangeSetRequest {
    ExchangeSetRequest::new(DataStandard::S63).with_products(["GB500001", "GB500002"])
}

#[tokio::test]
async fn test_poison_request_is_dropped_after_one_pass() {
    let t = TestSystem::start().await;
    let queue = t.system.dispatch().request_queue(DataStandard::S63);
    t.messaging
        .send(&queue, br#"{"jobId": 42}"#.to_vec())
        .await
        .unwrap();

    let monitor = t.system.request_monitor(DataStandard::S63);
    assert_eq!(monitor.poll_once().await.unwrap(), 1);
    assert_eq!(t.queue_length(&queue).await, 0);
    assert_eq!(monitor.poll_once().await.unwrap(), 0);
    assert_eq!(t.file_share.batches_created(), 0);
}

#[tokio::test]
async fn test_poison_response_is_dropped() {
    let t = TestSystem::start().await;
    let queue = t.system.dispatch().response_queue(DataStandard::S63);
    t.messaging.send(&queue, b"\xff\xfe".to_vec()).await.unwrap();

    let monitor = t.system.response_monitor(DataStandard::S63);
    assert_eq!(monitor.poll_once().await.unwrap(), 1);
    assert_eq!(t.queue_length(&queue).await, 0);
}

#[tokio::test]
async fn test_response_for_unknown_job_is_dropped() {
    let t = TestSystem::start().await;
    let job = t.system.submit(request()).await.unwrap().job;
    let mut build_request = BuildRequest::for_job(&job, "c-1");
    build_request.job_id = JobId::new("never-submitted").unwrap();

    t.system
        .dispatch()
        .enqueue_response(&BuildResponse::success(&build_request, BatchId::new("B9").unwrap()))
        .await
        .unwrap();

    let monitor = t.system.response_monitor(DataStandard::S63);
    assert_eq!(monitor.poll_once().await.unwrap(), 1);
    assert_eq!(t.response_queue_length(DataStandard::S63).await, 0);
    assert_eq!(t.job(&job.id).await.state_pair(), StatePair::SUBMITTED);
}

#[tokio::test]
async fn test_redelivered_response_does_not_notify_twice() {
    let t = TestSystem::start().await;
    let job = t
        .system
        .submit(request().with_callback_uri("https://caller.example/cb"))
        .await
        .unwrap()
        .job;
    t.run_builds(DataStandard::S63).await;
    assert_eq!(t.notifier.payloads().len(), 1);

    let response = BuildResponse::success(
        &BuildRequest::for_job(&job, "c-1"),
        BatchId::new("batch-1").unwrap(),
    );
    t.system.dispatch().enqueue_response(&response).await.unwrap();

    let monitor = t.system.response_monitor(DataStandard::S63);
    assert_eq!(monitor.poll_once().await.unwrap(), 1);
    assert_eq!(t.response_queue_length(DataStandard::S63).await, 0);
    assert_eq!(t.notifier.payloads().len(), 1);
    assert_eq!(t.job(&job.id).await.state_pair(), StatePair::COMPLETED);
}

#[tokio::test]
async fn test_peek_monitor_builds_each_job_once() {
    let t = TestSystem::with_config(test_config(PollMode::Peek)).await;
    let job = t.system.submit(request()).await.unwrap().job;

    // Re-enqueue the same request so it stays visible after the first build
    t.system
        .dispatch()
        .enqueue_request(&BuildRequest::for_job(&job, "c-2"))
        .await
        .unwrap();

    let monitor = t.system.request_monitor(DataStandard::S63);
    assert_eq!(monitor.poll_once().await.unwrap(), 1);
    // The answered duplicate is dropped rather than built again
    assert_eq!(monitor.poll_once().await.unwrap(), 1);
    assert_eq!(monitor.poll_once().await.unwrap(), 0);

    assert_eq!(t.file_share.batches_created(), 1);
    assert_eq!(t.request_queue_length(DataStandard::S63).await, 0);
}

#[tokio::test]
async fn test_peek_monitor_reaches_requests_behind_a_duplicate() {
    let mut config = test_config(PollMode::Peek);
    config.monitor.batch_size = 1;
    let t = TestSystem::with_config(config).await;

    let first = t.system.submit(request()).await.unwrap().job;
    t.system
        .dispatch()
        .enqueue_request(&BuildRequest::for_job(&first, "c-2"))
        .await
        .unwrap();
    let second = t
        .system
        .submit(ExchangeSetRequest::new(DataStandard::S63).with_products(["GB600001"]))
        .await
        .unwrap()
        .job;

    let monitor = t.system.request_monitor(DataStandard::S63);
    for _ in 0..3 {
        monitor.poll_once().await.unwrap();
    }
    assert_eq!(t.file_share.batches_created(), 2);
    assert_eq!(t.request_queue_length(DataStandard::S63).await, 0);

    let responses = t.system.response_monitor(DataStandard::S63);
    for _ in 0..2 {
        responses.poll_once().await.unwrap();
    }
    assert_eq!(t.job(&first.id).await.state_pair(), StatePair::COMPLETED);
    assert_eq!(t.job(&second.id).await.state_pair(), StatePair::COMPLETED);
}

#[tokio::test]
async fn test_spawned_monitors_complete_jobs_and_stop_on_shutdown() {
    let t = TestSystem::start().await;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = t.system.spawn_monitors(shutdown_rx);
    assert_eq!(handles.len(), 6);

    let job_id = t.system.submit(request()).await.unwrap().job.id;

    let completed = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if t.job(&job_id).await.state_pair() == StatePair::COMPLETED {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(completed.is_ok(), "job should complete through the monitors");

    shutdown_tx.send(true).unwrap();
    for handle in handles {
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("monitor stops promptly")
            .unwrap();
    }
}
