//! Job status and cancellation.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use tracing::info;

use emploi_models::{JobId, JobRecord};

use crate::auth::WebhookCaller;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// `GET /api/jobs/:job_id/status`
pub async fn get_job_status(
    State(state): State<AppState>,
    _caller: WebhookCaller,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobRecord>> {
    let record = state.dispatcher.job_status(&JobId::from_string(job_id)).await?;
    Ok(Json(record))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub job_id: JobId,
    pub cancelled: bool,
}

/// `POST /api/jobs/:job_id/cancel`
///
/// Only jobs no worker has claimed yet can be cancelled; `cancelled: false`
/// otherwise.
pub async fn cancel_job(
    State(state): State<AppState>,
    _caller: WebhookCaller,
    Path(job_id): Path<String>,
) -> ApiResult<Json<CancelResponse>> {
    if job_id.trim().is_empty() {
        return Err(ApiError::bad_request("Missing job id"));
    }

    let job_id = JobId::from_string(job_id);
    let cancelled = state.dispatcher.cancel_job(&job_id).await?;
    info!(job_id = %job_id, cancelled, "Cancel requested");

    Ok(Json(CancelResponse { job_id, cancelled }))
}
