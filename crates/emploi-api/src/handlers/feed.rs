//! Newsfeed handler.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use tracing::debug;

use emploi_feed::FeedPage;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::metrics;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

/// `GET /api/newsfeed`
pub async fn get_newsfeed(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<FeedQuery>,
) -> ApiResult<Json<FeedPage>> {
    let page = state
        .feed
        .page(user.user_id, query.cursor.as_deref(), query.limit)
        .await?;

    debug!(
        viewer_id = user.user_id,
        items = page.items.len(),
        has_more = page.next_cursor.is_some(),
        "Served newsfeed page"
    );
    metrics::record_feed_items(page.items.len());

    Ok(Json(page))
}
