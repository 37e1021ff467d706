//! Job payloads for the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use emploi_models::{JobId, JobType, NotificationBatch, PublicationId, UserId};

use crate::error::QueueResult;

/// Hard upper bound on recipients in one notification batch job.
pub const MAX_BATCH_RECIPIENTS: usize = 1000;

/// Analyze a job posting: extract skills, check the text.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct JobAnalysisJob {
    pub job_id: JobId,
    #[validate(range(min = 1))]
    pub job_posting_id: i64,
    pub created_at: DateTime<Utc>,
}

impl JobAnalysisJob {
    pub fn new(job_posting_id: i64) -> Self {
        Self {
            job_id: JobId::new(),
            job_posting_id,
            created_at: Utc::now(),
        }
    }
}

/// Run the content detector over one publication.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PostModerationJob {
    pub job_id: JobId,
    #[validate(range(min = 1))]
    pub publication_id: PublicationId,
    pub created_at: DateTime<Utc>,
}

impl PostModerationJob {
    pub fn new(publication_id: PublicationId) -> Self {
        Self {
            job_id: JobId::new(),
            publication_id,
            created_at: Utc::now(),
        }
    }
}

/// Recompute the activity score of one user.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ActivityScoringJob {
    pub job_id: JobId,
    #[validate(range(min = 1))]
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl ActivityScoringJob {
    pub fn new(user_id: UserId) -> Self {
        Self {
            job_id: JobId::new(),
            user_id,
            created_at: Utc::now(),
        }
    }
}

/// Deliver one notification batch; retried as a unit.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NotificationBatchJob {
    pub job_id: JobId,
    #[validate(custom(function = "validate_batch"))]
    pub batch: NotificationBatch,
    pub created_at: DateTime<Utc>,
}

impl NotificationBatchJob {
    pub fn new(batch: NotificationBatch) -> Self {
        Self {
            job_id: JobId::new(),
            batch,
            created_at: Utc::now(),
        }
    }
}

fn validate_batch(batch: &NotificationBatch) -> Result<(), ValidationError> {
    if batch.recipients.is_empty() {
        return Err(ValidationError::new("empty_recipients"));
    }
    if batch.recipients.len() > MAX_BATCH_RECIPIENTS {
        return Err(ValidationError::new("too_many_recipients"));
    }
    if batch.message.title.trim().is_empty() {
        return Err(ValidationError::new("empty_title"));
    }
    Ok(())
}

/// Generic job wrapper for queue storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum QueueJob {
    JobAnalysis(JobAnalysisJob),
    PostModeration(PostModerationJob),
    ActivityScoring(ActivityScoringJob),
    NotificationBatch(NotificationBatchJob),
}

impl QueueJob {
    pub fn job_id(&self) -> &JobId {
        match self {
            QueueJob::JobAnalysis(j) => &j.job_id,
            QueueJob::PostModeration(j) => &j.job_id,
            QueueJob::ActivityScoring(j) => &j.job_id,
            QueueJob::NotificationBatch(j) => &j.job_id,
        }
    }

    pub fn job_type(&self) -> JobType {
        match self {
            QueueJob::JobAnalysis(_) => JobType::JobAnalysis,
            QueueJob::PostModeration(_) => JobType::PostModeration,
            QueueJob::ActivityScoring(_) => JobType::ActivityScoring,
            QueueJob::NotificationBatch(_) => JobType::NotificationBatch,
        }
    }

    /// Check the payload before it is accepted by the queue.
    pub fn validate(&self) -> QueueResult<()> {
        match self {
            QueueJob::JobAnalysis(j) => j.validate()?,
            QueueJob::PostModeration(j) => j.validate()?,
            QueueJob::ActivityScoring(j) => j.validate()?,
            QueueJob::NotificationBatch(j) => j.validate()?,
        }
        Ok(())
    }
}

impl From<JobAnalysisJob> for QueueJob {
    fn from(job: JobAnalysisJob) -> Self {
        QueueJob::JobAnalysis(job)
    }
}

impl From<PostModerationJob> for QueueJob {
    fn from(job: PostModerationJob) -> Self {
        QueueJob::PostModeration(job)
    }
}

impl From<ActivityScoringJob> for QueueJob {
    fn from(job: ActivityScoringJob) -> Self {
        QueueJob::ActivityScoring(job)
    }
}

impl From<NotificationBatchJob> for QueueJob {
    fn from(job: NotificationBatchJob) -> Self {
        QueueJob::NotificationBatch(job)
    }
}
