//! Application state.

use std::sync::Arc;

use emploi_feed::{ContentDetector, DetectorConfig, FeedService, LexiconDetector, RankingConfig};
use emploi_queue::{JobDispatcher, JobQueue};
use emploi_store::{FeedStore, PgStore, StoreConfig};

use crate::auth::JwtVerifier;
use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub feed: Arc<FeedService>,
    pub store: Arc<dyn FeedStore>,
    pub dispatcher: Arc<dyn JobDispatcher>,
    pub auth: Arc<JwtVerifier>,
}

impl AppState {
    /// Create application state from environment configuration.
    pub async fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let store = PgStore::connect(&StoreConfig::from_env()).await?;

        let queue = JobQueue::from_env()?;
        queue.init().await?;

        let detector = LexiconDetector::new(&DetectorConfig::from_env())?;

        Ok(Self::from_parts(
            config,
            Arc::new(store),
            Arc::new(detector),
            Arc::new(queue),
            RankingConfig::from_env(),
        ))
    }

    /// Assemble state from already-built collaborators.
    pub fn from_parts(
        config: ApiConfig,
        store: Arc<dyn FeedStore>,
        detector: Arc<dyn ContentDetector>,
        dispatcher: Arc<dyn JobDispatcher>,
        ranking: RankingConfig,
    ) -> Self {
        let feed = FeedService::new(Arc::clone(&store), detector, ranking);
        let auth = JwtVerifier::new(&config.jwt_secret);

        Self {
            config,
            feed: Arc::new(feed),
            store,
            dispatcher,
            auth: Arc::new(auth),
        }
    }
}
