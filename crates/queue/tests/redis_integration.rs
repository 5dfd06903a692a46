//! Redis integration tests.
//!
//! These tests require a running Redis instance.
//! Run with: `cargo test --test redis_integration -- --ignored`
//!
//! Set `REDIS_URL` environment variable to point to your Redis instance.
//! Default: <redis://localhost:6379>

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use taleforge_core::{JobStatus, ProgressSink, ProgressUpdate};
use taleforge_queue::{
    DeadLetterEntry, DeadLetterQueue, DeadLetterSink, GenerateContentJob, ProgressPublisher,
};

fn get_redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
}

#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_progress_publisher_connects() {
    let publisher = ProgressPublisher::new(&get_redis_url()).await;
    assert!(
        publisher.is_ok(),
        "Failed to connect to Redis: {:?}",
        publisher.err()
    );
}

#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_progress_round_trip() {
    let publisher = ProgressPublisher::new(&get_redis_url())
        .await
        .expect("Failed to connect to Redis");

    publisher
        .subscribe_job("itest-job-1")
        .await
        .expect("Failed to subscribe");
    publisher.start();
    let mut rx = publisher.subscribe_local();

    // Give the subscription a moment to register server-side.
    tokio::time::sleep(Duration::from_millis(100)).await;

    publisher
        .publish(
            ProgressUpdate::new("itest-job-1", JobStatus::Running, 30)
                .with_message("Story text generated"),
        )
        .await;

    let received = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("Timed out waiting for progress update")
        .expect("Broadcast channel closed");

    assert_eq!(received.job_id, "itest-job-1");
    assert_eq!(received.progress_percent, 30);

    publisher.shutdown().await.expect("Failed to shutdown");
}

#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_dead_letter_queue_park_and_peek() {
    let dlq = DeadLetterQueue::connect(&get_redis_url(), "taleforge-itest")
        .await
        .expect("Failed to connect to Redis");

    let before = dlq.depth().await.unwrap();

    let entry = DeadLetterEntry::new(
        GenerateContentJob::new("itest-job-2"),
        "content_generation",
        "unprocessable input: itest",
        1,
    );
    dlq.park(entry).await.expect("Failed to park entry");

    assert_eq!(dlq.depth().await.unwrap(), before + 1);

    let entries = dlq.peek(10).await.unwrap();
    assert!(entries.iter().any(|e| e.task.job_id == "itest-job-2"));

    // Drain our entry so reruns start clean.
    while let Some(popped) = dlq.pop().await.unwrap() {
        if popped.task.job_id == "itest-job-2" {
            break;
        }
    }
}
