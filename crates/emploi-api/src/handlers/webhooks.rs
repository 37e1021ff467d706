//! Webhook triggers.
//!
//! Each trigger only enqueues a job; the work itself runs in a worker.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use emploi_models::{JobId, JobState, PublicationId, UserId};
use emploi_queue::{ActivityScoringJob, JobAnalysisJob, PostModerationJob, QueueError, QueueJob};

use crate::auth::WebhookCaller;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeJobRequest {
    #[validate(range(min = 1))]
    pub job_id: i64,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ModeratePostRequest {
    #[validate(range(min = 1))]
    pub publication_id: PublicationId,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ScoreActivityRequest {
    #[validate(range(min = 1))]
    pub user_id: UserId,
}

/// Acknowledgement returned once the job is in the queue.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueuedResponse {
    pub job_id: JobId,
    pub status: JobState,
}

fn validate(request: &impl Validate) -> ApiResult<()> {
    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))
}

/// Enqueue within the configured timeout.
async fn enqueue(state: &AppState, job: QueueJob) -> ApiResult<Json<EnqueuedResponse>> {
    let job_type = job.job_type();
    let timeout = state.config.enqueue_timeout;

    let job_id = match tokio::time::timeout(timeout, state.dispatcher.dispatch(job)).await {
        Ok(Ok(job_id)) => job_id,
        Ok(Err(QueueError::Validation(msg))) => return Err(ApiError::Validation(msg)),
        Ok(Err(e)) => {
            warn!(job_type = job_type.as_str(), "Failed to enqueue job: {}", e);
            metrics::record_enqueue_failure(job_type.as_str(), "queue");
            return Err(ApiError::unavailable("Job queue unavailable"));
        }
        Err(_) => {
            warn!(
                job_type = job_type.as_str(),
                timeout_ms = timeout.as_millis() as u64,
                "Enqueue timed out"
            );
            metrics::record_enqueue_failure(job_type.as_str(), "timeout");
            return Err(ApiError::unavailable("Job queue did not answer in time"));
        }
    };

    info!(job_id = %job_id, job_type = job_type.as_str(), "Job enqueued");
    metrics::record_job_enqueued(job_type.as_str());

    Ok(Json(EnqueuedResponse {
        job_id,
        status: JobState::Pending,
    }))
}

/// `POST /api/jobs/analyze`
pub async fn analyze_job_posting(
    State(state): State<AppState>,
    _caller: WebhookCaller,
    Json(request): Json<AnalyzeJobRequest>,
) -> ApiResult<Json<EnqueuedResponse>> {
    validate(&request)?;
    enqueue(&state, JobAnalysisJob::new(request.job_id).into()).await
}

/// `POST /api/posts/moderate`
pub async fn moderate_post(
    State(state): State<AppState>,
    _caller: WebhookCaller,
    Json(request): Json<ModeratePostRequest>,
) -> ApiResult<Json<EnqueuedResponse>> {
    validate(&request)?;
    enqueue(&state, PostModerationJob::new(request.publication_id).into()).await
}

/// `POST /api/activity/score`
pub async fn score_activity(
    State(state): State<AppState>,
    _caller: WebhookCaller,
    Json(request): Json<ScoreActivityRequest>,
) -> ApiResult<Json<EnqueuedResponse>> {
    validate(&request)?;
    enqueue(&state, ActivityScoringJob::new(request.user_id).into()).await
}
