//! Integration tests for rescue-queue

use rescue_queue::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_job_creation() {
    let job = Job::new("default", "send_email", json!({"to": "user@example.com"}));

    assert_eq!(job.job_type, "send_email");
    assert!(!job.args.is_null());
    assert_eq!(job.attempts, 0);
}

#[test]
fn test_redis_config_builder() {
    let config = RedisQueueConfig::new("redis://localhost:6379")
        .with_queues(["default", "low"])
        .with_max_size(1000)
        .with_retention_time(Duration::from_secs(86400));

    assert_eq!(config.queues.len(), 2);
    assert_eq!(config.max_size, 1000);
}

#[test]
fn test_queue_error_display() {
    let err = QueueError::JobNotFound("job123".to_string());
    assert!(err.to_string().contains("job123"));
}

#[tokio::test]
async fn test_failed_job_is_retried_by_host_then_completes() {
    let queue = Arc::new(MemoryQueue::new());
    let job = Job::new("default", "flaky", json!([]));
    let id = queue.submit(job).await.unwrap();

    let mut worker = Worker::new(queue.clone());
    let calls = Arc::new(std::sync::atomic::AtomicU32::new(0));
    let counter = calls.clone();
    worker.register_handler("flaky", move |_job| {
        let counter = counter.clone();
        async move {
            if counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                Err(JobError::from("first run fails"))
            } else {
                Ok(())
            }
        }
    });

    let first = worker.process_next().await.unwrap().unwrap();
    assert!(matches!(first, JobRun::Failed { .. }));

    // Host backoff scheduled the retry in the future
    assert!(worker.process_next().await.unwrap().is_none());
    let mut retried = queue.take(id).await.unwrap();
    retried.scheduled_at = None;
    queue.submit(retried).await.unwrap();

    let second = worker.process_next().await.unwrap().unwrap();
    assert_eq!(second, JobRun::Completed(id));
}

// Note: These tests require Redis running
// Run with: cargo test -- --ignored

#[tokio::test]
#[ignore]
async fn test_redis_submit_and_dequeue() {
    let queue = RedisQueue::connect(
        RedisQueueConfig::new("redis://localhost:6379").with_key_prefix("rescue-test"),
    )
    .await
    .unwrap();
    queue.clear().await.unwrap();

    let id = queue
        .submit(Job::new("default", "send_email", json!(["test@example.com"])))
        .await
        .unwrap();

    let job = queue.dequeue().await.unwrap().unwrap();
    assert_eq!(job.id, id);
    queue.complete(&job).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_redis_scheduled_job_waits() {
    let queue = RedisQueue::connect(
        RedisQueueConfig::new("redis://localhost:6379").with_key_prefix("rescue-test-delayed"),
    )
    .await
    .unwrap();
    queue.clear().await.unwrap();

    queue
        .submit(
            Job::new("default", "later", json!([]))
                .schedule_after(chrono::Duration::minutes(10)),
        )
        .await
        .unwrap();

    assert!(queue.dequeue().await.unwrap().is_none());
}

#[tokio::test]
#[ignore]
async fn test_redis_complete_keeps_restarted_run() {
    let queue = RedisQueue::connect(
        RedisQueueConfig::new("redis://localhost:6379").with_key_prefix("rescue-test-restart"),
    )
    .await
    .unwrap();
    queue.clear().await.unwrap();

    queue
        .submit(Job::new("default", "report", json!([])))
        .await
        .unwrap();
    let first = queue.dequeue().await.unwrap().unwrap();

    // Resubmitted under the same id and picked up again before the first run acks
    let mut again = first.clone();
    again.state = JobState::Pending;
    queue.submit(again).await.unwrap();
    let second = queue.dequeue().await.unwrap().unwrap();
    assert_ne!(second.run_id, first.run_id);

    queue.complete(&first).await.unwrap();

    let stored = queue.get_job(first.id).await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Processing);
    assert_eq!(stored.run_id, second.run_id);

    queue.complete(&second).await.unwrap();
    let stored = queue.get_job(first.id).await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Completed);
}
