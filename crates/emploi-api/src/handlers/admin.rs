//! Operator endpoints.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use emploi_queue::QueueStats;

use crate::auth::WebhookCaller;
use crate::error::ApiResult;
use crate::metrics;
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatusResponse {
    #[serde(flatten)]
    pub stats: QueueStats,
    pub healthy: bool,
}

/// `GET /api/admin/queue/status`
pub async fn get_queue_status(
    State(state): State<AppState>,
    _caller: WebhookCaller,
) -> ApiResult<Json<QueueStatusResponse>> {
    let stats = state.dispatcher.queue_stats().await?;
    metrics::set_queue_depths(stats.stream, stats.delayed, stats.dead_letter);

    Ok(Json(QueueStatusResponse {
        stats,
        healthy: stats.dead_letter == 0,
    }))
}
