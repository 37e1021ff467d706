//! Feed service: ranking, safety filtering and cursor encoding for one request.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Serialize;
use tracing::{debug, instrument};

use emploi_models::UserId;
use emploi_store::FeedStore;

use crate::cursor::FeedCursor;
use crate::detector::ContentDetector;
use crate::error::FeedResult;
use crate::ranking::{rank_page, RankingConfig};
use crate::safety::{FeedItem, SafetyFilter};

/// One page of the newsfeed as returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FeedPage {
    pub items: Vec<FeedItem>,
    pub next_cursor: Option<String>,
}

pub struct FeedService {
    store: Arc<dyn FeedStore>,
    filter: SafetyFilter,
    config: RankingConfig,
}

impl FeedService {
    pub fn new(
        store: Arc<dyn FeedStore>,
        detector: Arc<dyn ContentDetector>,
        config: RankingConfig,
    ) -> Self {
        Self {
            store,
            filter: SafetyFilter::new(detector),
            config,
        }
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    /// Build the page after `cursor` for `viewer_id`.
    ///
    /// The next cursor reflects what ranking emitted, so items dropped by the
    /// safety filter are not fetched again on the following page.
    #[instrument(skip(self, cursor))]
    pub async fn page(
        &self,
        viewer_id: UserId,
        cursor: Option<&str>,
        limit: Option<usize>,
    ) -> FeedResult<FeedPage> {
        let cursor = FeedCursor::from_param(cursor)?;
        let page_size = self.config.page_size(limit);

        let ranked = rank_page(self.store.as_ref(), &self.config, cursor, page_size).await?;
        let viewer = self.store.viewer_context(viewer_id).await?;

        let ranked_len = ranked.items.len();
        let items = self.filter.apply(
            ranked.items.into_iter().map(FeedItem::from).collect(),
            &viewer,
        );
        debug!(
            ranked = ranked_len,
            served = items.len(),
            has_more = ranked.next_cursor.is_some(),
            "Feed page built"
        );

        Ok(FeedPage {
            items,
            next_cursor: ranked.next_cursor.map(|c| c.encode()),
        })
    }
}
