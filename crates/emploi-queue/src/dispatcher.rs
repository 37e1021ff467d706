//! Producer-side view of the queue.

use async_trait::async_trait;

use emploi_models::{JobId, JobRecord};

use crate::alerts::OperatorAlert;
use crate::error::QueueResult;
use crate::job::QueueJob;
use crate::queue::{JobQueue, QueueStats};

/// What request handlers and batch sinks need from the queue.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    /// Validate and enqueue; never waits for the job to run.
    async fn dispatch(&self, job: QueueJob) -> QueueResult<JobId>;

    async fn job_status(&self, job_id: &JobId) -> QueueResult<JobRecord>;

    /// `false` once a worker holds the job or it has finished.
    async fn cancel_job(&self, job_id: &JobId) -> QueueResult<bool>;

    async fn queue_stats(&self) -> QueueResult<QueueStats>;

    async fn check(&self) -> QueueResult<()>;

    /// Publish on the operator alert channel.
    async fn raise_alert(&self, alert: &OperatorAlert) -> QueueResult<()>;
}

#[async_trait]
impl JobDispatcher for JobQueue {
    async fn dispatch(&self, job: QueueJob) -> QueueResult<JobId> {
        self.enqueue(job).await
    }

    async fn job_status(&self, job_id: &JobId) -> QueueResult<JobRecord> {
        self.status(job_id).await
    }

    async fn cancel_job(&self, job_id: &JobId) -> QueueResult<bool> {
        self.cancel(job_id).await
    }

    async fn queue_stats(&self) -> QueueResult<QueueStats> {
        self.stats().await
    }

    async fn check(&self) -> QueueResult<()> {
        self.ping().await
    }

    async fn raise_alert(&self, alert: &OperatorAlert) -> QueueResult<()> {
        self.alerts().publish(alert).await?;
        Ok(())
    }
}
