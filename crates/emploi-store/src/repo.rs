//! Storage traits consumed by the feed service and the workers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use emploi_models::{
    ActivityCounts, ActivityScore, Cohort, DeliveryReport, FeedPosition, JobPosting,
    JobPostingAnalysis, ModerationStatus, Publication, PublicationId, UserId, ViewerContext,
};

use crate::error::StoreResult;

/// Read side of the newsfeed.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Servable publications of one cohort, in feed order, strictly after `after`.
    async fn fetch_cohort(
        &self,
        cohort: Cohort,
        after: Option<FeedPosition>,
        limit: usize,
    ) -> StoreResult<Vec<Publication>>;

    /// Block and connection relations of the viewer.
    async fn viewer_context(&self, viewer_id: UserId) -> StoreResult<ViewerContext>;

    /// Connectivity check for readiness probes.
    async fn ping(&self) -> StoreResult<()>;
}

/// Reads and writes performed by background workers.
#[async_trait]
pub trait WorkStore: Send + Sync {
    async fn publication(&self, id: PublicationId) -> StoreResult<Publication>;

    async fn set_moderation(
        &self,
        id: PublicationId,
        status: ModerationStatus,
        reason: Option<&str>,
    ) -> StoreResult<()>;

    async fn job_posting(&self, id: i64) -> StoreResult<JobPosting>;

    async fn save_job_analysis(&self, analysis: &JobPostingAnalysis) -> StoreResult<()>;

    /// Activity of `user_id` since `since`; `NotFound` for unknown users.
    async fn activity_counts(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> StoreResult<ActivityCounts>;

    async fn save_activity_score(&self, score: &ActivityScore) -> StoreResult<()>;

    /// Persist per-recipient delivery outcomes of one batch.
    async fn record_deliveries(&self, report: &DeliveryReport) -> StoreResult<()>;
}
