//! Notification batch delivery.

use tracing::{info, warn};

use emploi_models::NotificationBatch;

use crate::error::WorkerResult;
use crate::metrics;
use crate::processor::ProcessingContext;

/// Send one batch through the provider and record per-recipient outcomes.
///
/// A provider failure fails the whole batch, which the queue retries as a
/// unit. Individual rejections are stored and do not fail the job.
pub async fn deliver_batch(ctx: &ProcessingContext, batch: &NotificationBatch) -> WorkerResult<()> {
    ctx.limiter.acquire().await;

    let report = ctx.provider.send(batch).await?;
    ctx.store.record_deliveries(&report).await?;

    let accepted = report.accepted_count();
    let rejected = report.rejected_count();
    metrics::record_deliveries(accepted, rejected);

    if rejected > 0 {
        warn!(batch_id = %batch.batch_id, accepted, rejected, "Batch partially rejected");
    } else {
        info!(batch_id = %batch.batch_id, accepted, "Batch delivered");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkerError;
    use crate::processor::testing::{harness, FakeProvider};
    use emploi_models::{NotificationKind, NotificationMessage};
    use emploi_notify::NotifyError;

    fn batch() -> NotificationBatch {
        let message = NotificationMessage::new(NotificationKind::JobAlert, "Nouvelle offre", "Développeur Rust à Lyon");
        NotificationBatch::new(vec![1, 2, 3], message)
    }

    #[tokio::test]
    async fn test_partial_rejection_is_recorded() {
        let h = harness(FakeProvider {
            rejected: vec![2],
            ..Default::default()
        });
        let batch = batch();

        deliver_batch(&h.ctx, &batch).await.unwrap();

        let outcomes = h.store.deliveries(&batch.batch_id).await;
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].accepted);
        assert!(!outcomes[1].accepted);
        assert_eq!(outcomes[1].reason.as_deref(), Some("no_device_token"));
        assert!(outcomes[2].accepted);
    }

    #[tokio::test]
    async fn test_provider_overload_is_retried() {
        let h = harness(FakeProvider {
            fail_status: Some(503),
            ..Default::default()
        });
        let batch = batch();

        let err = deliver_batch(&h.ctx, &batch).await.unwrap_err();
        assert!(matches!(err, WorkerError::Notify(NotifyError::Transient { .. })));
        assert!(err.is_retryable());
        assert!(h.store.deliveries(&batch.batch_id).await.is_empty());
    }

    #[tokio::test]
    async fn test_refused_batch_is_not_retried() {
        let h = harness(FakeProvider {
            fail_status: Some(400),
            ..Default::default()
        });

        let err = deliver_batch(&h.ctx, &batch()).await.unwrap_err();
        assert!(!err.is_retryable());
    }
}
