//! Job dispatch to the per-type processors.

use std::sync::Arc;

use emploi_feed::ContentDetector;
use emploi_notify::{DeliveryLimiter, NotificationSender, PushProvider};
use emploi_queue::{QueueError, QueueJob};
use emploi_store::WorkStore;

use crate::analysis::{analyze_job_posting, SkillExtractor};
use crate::config::WorkerConfig;
use crate::delivery::deliver_batch;
use crate::error::{WorkerError, WorkerResult};
use crate::moderation::moderate_publication;
use crate::scoring::score_activity;

/// Everything a processor may touch, passed in by construction.
pub struct ProcessingContext {
    pub config: WorkerConfig,
    pub store: Arc<dyn WorkStore>,
    pub detector: Arc<dyn ContentDetector>,
    pub skills: SkillExtractor,
    pub notifier: NotificationSender,
    pub provider: Arc<dyn PushProvider>,
    pub limiter: Arc<DeliveryLimiter>,
}

impl ProcessingContext {
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn WorkStore>,
        detector: Arc<dyn ContentDetector>,
        notifier: NotificationSender,
        provider: Arc<dyn PushProvider>,
        limiter: Arc<DeliveryLimiter>,
    ) -> Self {
        let skills = SkillExtractor::new(&config.skills);
        Self {
            config,
            store,
            detector,
            skills,
            notifier,
            provider,
            limiter,
        }
    }
}

/// Run one job to completion.
pub async fn process_job(ctx: &ProcessingContext, job: &QueueJob) -> WorkerResult<()> {
    // Payloads were validated at enqueue; a record edited in Redis is not
    job.validate().map_err(|e| match e {
        QueueError::Validation(msg) => WorkerError::Validation(msg),
        other => WorkerError::Queue(other),
    })?;

    match job {
        QueueJob::JobAnalysis(j) => analyze_job_posting(ctx, j.job_posting_id).await,
        QueueJob::PostModeration(j) => moderate_publication(ctx, j.publication_id).await,
        QueueJob::ActivityScoring(j) => score_activity(ctx, j.user_id).await,
        QueueJob::NotificationBatch(j) => deliver_batch(ctx, &j.batch).await,
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use emploi_queue::PostModerationJob;

    #[tokio::test]
    async fn test_tampered_payload_is_not_retried() {
        let h = harness(FakeProvider::default());
        let job: QueueJob = PostModerationJob::new(0).into();

        let err = process_job(&h.ctx, &job).await.unwrap_err();
        assert!(matches!(err, WorkerError::Validation(_)));
        assert!(!err.is_retryable());
    }
}
