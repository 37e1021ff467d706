//! Redis-backed queue integration tests.

use std::time::Duration;

use chrono::Utc;
use emploi_models::{FailureOutcome, JobState};
use emploi_queue::{
    JobAnalysisJob, JobQueue, PostModerationJob, QueueConfig, QueueError, RetryPolicy,
};

/// Queue on isolated keys so tests can run in parallel against one Redis.
async fn test_queue(max_attempts: u32) -> JobQueue {
    dotenvy::dotenv().ok();

    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let config = QueueConfig {
        redis_url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
        stream_name: format!("test:{}:jobs", suffix),
        consumer_group: format!("test:{}:workers", suffix),
        dlq_stream_name: format!("test:{}:dlq", suffix),
        delayed_set_name: format!("test:{}:delayed", suffix),
        status_key_prefix: format!("test:{}:job:", suffix),
        alert_channel: format!("test:{}:alerts", suffix),
        retry: RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
        },
        visibility_timeout: Duration::from_millis(50),
    };

    let queue = JobQueue::new(config).expect("Failed to create queue");
    queue.init().await.expect("Failed to initialize queue");
    queue
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_enqueue_claim_complete() {
    let queue = test_queue(3).await;

    let job_id = queue
        .enqueue(PostModerationJob::new(7))
        .await
        .expect("Failed to enqueue");
    assert_eq!(queue.status(&job_id).await.unwrap().status, JobState::Pending);

    let jobs = queue.claim("consumer-a", 10, 100).await.expect("Failed to claim");
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].job_id(), &job_id);
    assert_eq!(jobs[0].attempt, 1);

    // Nobody else gets the same entry.
    let others = queue.claim("consumer-b", 10, 100).await.unwrap();
    assert!(others.is_empty());

    queue.complete(&jobs[0]).await.expect("Failed to complete");
    let record = queue.status(&job_id).await.unwrap();
    assert_eq!(record.status, JobState::Completed);
    assert_eq!(queue.len().await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_retries_until_dead_letter() {
    let queue = test_queue(3).await;
    let job_id = queue.enqueue(JobAnalysisJob::new(42)).await.unwrap();

    let mut statuses = vec![queue.status(&job_id).await.unwrap().status];
    for expected_attempt in 1..=3u32 {
        let claimed = loop {
            queue.promote_due(Utc::now() + chrono::Duration::seconds(1), 10).await.unwrap();
            let mut jobs = queue.claim("worker", 1, 100).await.unwrap();
            if let Some(job) = jobs.pop() {
                break job;
            }
        };
        assert_eq!(claimed.attempt, expected_attempt);
        statuses.push(queue.status(&job_id).await.unwrap().status);

        let outcome = queue.fail(&claimed, "analysis service down", true).await.unwrap();
        statuses.push(queue.status(&job_id).await.unwrap().status);
        assert_eq!(outcome.is_permanent(), expected_attempt == 3);
    }

    use JobState::*;
    assert_eq!(
        statuses,
        vec![Pending, Active, Pending, Active, Pending, Active, Failed]
    );
    let record = queue.status(&job_id).await.unwrap();
    assert!(record.permanent);
    assert_eq!(record.attempts, 3);
    assert_eq!(queue.dlq_len().await.unwrap(), 1);
    assert_eq!(queue.delayed_len().await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_non_retryable_failure_goes_straight_to_dlq() {
    let queue = test_queue(5).await;
    let job_id = queue.enqueue(PostModerationJob::new(99)).await.unwrap();

    let jobs = queue.claim("worker", 1, 100).await.unwrap();
    let outcome = queue.fail(&jobs[0], "publication not found", false).await.unwrap();

    assert!(matches!(outcome, FailureOutcome::Permanent { attempts: 1, .. }));
    assert_eq!(queue.status(&job_id).await.unwrap().status, JobState::Failed);
    assert_eq!(queue.dlq_len().await.unwrap(), 1);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_expired_claim_is_reclaimed() {
    let queue = test_queue(3).await;
    let job_id = queue.enqueue(PostModerationJob::new(5)).await.unwrap();

    let crashed = queue.claim("crashed-worker", 1, 100).await.unwrap();
    assert_eq!(crashed.len(), 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let reclaimed = queue.reclaim_expired("healthy-worker", 10).await.unwrap();

    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].job_id(), &job_id);
    assert_eq!(reclaimed[0].attempt, 2);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_late_worker_cannot_settle_a_taken_over_job() {
    let queue = test_queue(3).await;
    let job_id = queue.enqueue(PostModerationJob::new(6)).await.unwrap();

    let late = queue.claim("slow-worker", 1, 100).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let current = queue.reclaim_expired("healthy-worker", 10).await.unwrap();
    assert_eq!(current[0].attempt, 2);

    let err = queue.complete(&late[0]).await.unwrap_err();
    assert!(matches!(err, QueueError::StaleClaim(_)));
    let err = queue.fail(&late[0], "late failure", false).await.unwrap_err();
    assert!(matches!(err, QueueError::StaleClaim(_)));

    let record = queue.status(&job_id).await.unwrap();
    assert_eq!(record.status, JobState::Active);
    assert_eq!(record.attempts, 2);
    assert_eq!(queue.dlq_len().await.unwrap(), 0);

    queue.complete(&current[0]).await.expect("current claim completes");
    assert_eq!(queue.status(&job_id).await.unwrap().status, JobState::Completed);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_cancel_only_before_claim() {
    let queue = test_queue(3).await;

    let cancelled = queue.enqueue(PostModerationJob::new(1)).await.unwrap();
    assert!(queue.cancel(&cancelled).await.unwrap());
    let record = queue.status(&cancelled).await.unwrap();
    assert_eq!(record.status, JobState::Failed);
    assert_eq!(record.last_error.as_deref(), Some("cancelled"));

    // The cancelled entry is skipped by consumers.
    let running = queue.enqueue(PostModerationJob::new(2)).await.unwrap();
    let jobs = queue.claim("worker", 10, 100).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].job_id(), &running);

    assert!(!queue.cancel(&running).await.unwrap());
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_invalid_payload_is_rejected_at_enqueue() {
    let queue = test_queue(3).await;
    let err = queue.enqueue(JobAnalysisJob::new(0)).await.unwrap_err();
    assert!(matches!(err, QueueError::Validation(_)));
    assert_eq!(queue.len().await.unwrap(), 0);
}
