//! Batcher output onto the job queue.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error};

use emploi_models::{JobId, JobType, NotificationBatch};
use emploi_notify::{chunk_recipients, BatchSink, NotifyError, NotifyResult};
use emploi_queue::{
    JobDispatcher, NotificationBatchJob, OperatorAlert, QueueError, MAX_BATCH_RECIPIENTS,
};

/// Turns every emitted batch into a `notification-batch` job.
///
/// Batches larger than the queue accepts are split first. Batches that never
/// reach the queue are reported on the operator alert channel.
pub struct QueueBatchSink {
    dispatcher: Arc<dyn JobDispatcher>,
}

impl QueueBatchSink {
    pub fn new(dispatcher: Arc<dyn JobDispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl BatchSink for QueueBatchSink {
    async fn emit(&self, batch: NotificationBatch) -> NotifyResult<()> {
        let chunks = if batch.recipients.len() > MAX_BATCH_RECIPIENTS {
            let message = batch.message;
            chunk_recipients(batch.recipients, MAX_BATCH_RECIPIENTS)
                .into_iter()
                .map(|recipients| NotificationBatch::new(recipients, message.clone()))
                .collect()
        } else {
            vec![batch]
        };

        for chunk in chunks {
            let batch_id = chunk.batch_id.clone();
            let job_id = self
                .dispatcher
                .dispatch(NotificationBatchJob::new(chunk).into())
                .await
                .map_err(|e| match e {
                    QueueError::Validation(msg) => {
                        NotifyError::Rejected { status: 400, message: msg }
                    }
                    other => NotifyError::Sink(other.to_string()),
                })?;
            debug!(batch_id = %batch_id, job_id = %job_id, "Queued notification batch");
        }
        Ok(())
    }

    async fn report_lost(&self, batch: &NotificationBatch, reason: &str) {
        error!(
            batch_id = %batch.batch_id,
            recipients = batch.len(),
            "Notification batch lost: {}",
            reason
        );

        // The batch never became a job; its id stands in for one
        let alert = OperatorAlert {
            job_id: JobId::from_string(batch.batch_id.clone()),
            job_type: JobType::NotificationBatch,
            attempts: 0,
            reason: format!("{} recipients not notified: {}", batch.len(), reason),
            failed_at: Utc::now(),
        };
        if let Err(e) = self.dispatcher.raise_alert(&alert).await {
            error!(batch_id = %batch.batch_id, "Failed to publish operator alert: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emploi_models::{JobRecord, NotificationKind, NotificationMessage};
    use emploi_queue::{QueueJob, QueueResult, QueueStats};
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct FakeDispatcher {
        jobs: Mutex<Vec<QueueJob>>,
        alerts: Mutex<Vec<OperatorAlert>>,
        down: bool,
    }

    #[async_trait]
    impl JobDispatcher for FakeDispatcher {
        async fn dispatch(&self, job: QueueJob) -> QueueResult<JobId> {
            if self.down {
                return Err(QueueError::Redis(redis_down()));
            }
            job.validate()?;
            let id = job.job_id().clone();
            self.jobs.lock().await.push(job);
            Ok(id)
        }

        async fn job_status(&self, job_id: &JobId) -> QueueResult<JobRecord> {
            Err(QueueError::JobNotFound(job_id.to_string()))
        }

        async fn cancel_job(&self, _job_id: &JobId) -> QueueResult<bool> {
            Ok(false)
        }

        async fn queue_stats(&self) -> QueueResult<QueueStats> {
            Ok(QueueStats::default())
        }

        async fn check(&self) -> QueueResult<()> {
            Ok(())
        }

        async fn raise_alert(&self, alert: &OperatorAlert) -> QueueResult<()> {
            self.alerts.lock().await.push(alert.clone());
            Ok(())
        }
    }

    fn redis_down() -> redis::RedisError {
        redis::RedisError::from((redis::ErrorKind::IoError, "connection refused"))
    }

    fn message() -> NotificationMessage {
        NotificationMessage::new(NotificationKind::System, "Maintenance", "Service indisponible ce soir")
    }

    #[tokio::test]
    async fn test_oversized_batch_is_split() {
        let dispatcher = Arc::new(FakeDispatcher::default());
        let sink = QueueBatchSink::new(dispatcher.clone());

        sink.emit(NotificationBatch::new((1..=2500).collect(), message()))
            .await
            .unwrap();

        let jobs = dispatcher.jobs.lock().await;
        let sizes: Vec<usize> = jobs
            .iter()
            .map(|job| match job {
                QueueJob::NotificationBatch(j) => j.batch.len(),
                other => panic!("unexpected job {:?}", other.job_type()),
            })
            .collect();
        assert_eq!(sizes, vec![1000, 1000, 500]);
    }

    #[tokio::test]
    async fn test_queue_outage_is_retryable() {
        let dispatcher = Arc::new(FakeDispatcher {
            down: true,
            ..Default::default()
        });
        let sink = QueueBatchSink::new(dispatcher);

        let err = sink
            .emit(NotificationBatch::new(vec![1], message()))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_lost_batch_raises_operator_alert() {
        let dispatcher = Arc::new(FakeDispatcher::default());
        let sink = QueueBatchSink::new(dispatcher.clone());
        let batch = NotificationBatch::new(vec![1, 2, 3], message());

        sink.report_lost(&batch, "batcher stopped after 4 failed emits").await;

        let alerts = dispatcher.alerts.lock().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].job_id.as_str(), batch.batch_id);
        assert_eq!(alerts[0].job_type, JobType::NotificationBatch);
        assert!(alerts[0].reason.starts_with("3 recipients not notified"));
        assert!(dispatcher.jobs.lock().await.is_empty());
    }
}
