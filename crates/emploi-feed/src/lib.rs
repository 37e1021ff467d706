//! Newsfeed ranking and content safety filtering.
//!
//! A feed page is built in three steps:
//! 1. `ranking` reads both cohorts from the store and composes the page
//!    (certified boost window, then recency)
//! 2. `safety` prunes and annotates the page for the viewer
//! 3. `cursor` encodes where each cohort stopped

pub mod cursor;
pub mod detector;
pub mod error;
pub mod ranking;
pub mod safety;
pub mod service;

pub use cursor::FeedCursor;
pub use detector::{ContentDetector, Detection, DetectorConfig, DetectorError, LexiconDetector};
pub use error::{FeedError, FeedResult};
pub use ranking::{compose_page, rank_page, RankedPage, RankingConfig};
pub use safety::{FeedItem, SafetyFilter, SafetyRule};
pub use service::{FeedPage, FeedService};
