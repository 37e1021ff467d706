//! Hybrid feed ordering: a bounded certified window followed by recency.
//!
//! Each page is composed from two cohorts read independently with keyset
//! pagination:
//! - up to `boost_cap` certified-author posts lead the page
//! - the remaining slots are filled with regular posts
//!
//! Within each cohort order is `created_at` descending, lower id first.
//! Certified posts never exceed the cap, even when regular posts run out;
//! the leftover certified posts are served on the following pages.
//!
//! A zero boost fraction turns the window off: both cohorts are merged in
//! plain recency order.

use tracing::debug;

use emploi_models::{Cohort, FeedPosition, Publication};
use emploi_store::FeedStore;

use crate::cursor::FeedCursor;
use crate::error::FeedResult;

/// Ranking configuration.
#[derive(Debug, Clone)]
pub struct RankingConfig {
    /// Page size when the request does not ask for one
    pub default_page_size: usize,
    /// Upper bound for a requested page size
    pub max_page_size: usize,
    /// Share of a page reserved for certified authors (0.0 - 1.0)
    pub boost_fraction: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
            boost_fraction: 0.25,
        }
    }
}

impl RankingConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_page_size: std::env::var("FEED_PAGE_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.default_page_size),
            max_page_size: std::env::var("FEED_MAX_PAGE_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_page_size),
            boost_fraction: std::env::var("FEED_BOOST_FRACTION")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|f: &f64| f.is_finite())
                .unwrap_or(defaults.boost_fraction),
        }
    }

    /// Effective page size for a request, clamped to `1..=max_page_size`.
    pub fn page_size(&self, requested: Option<usize>) -> usize {
        let max = self.max_page_size.max(1);
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, max)
    }

    /// Maximum number of certified posts leading a page of `page_size`.
    ///
    /// Zero when the fraction is zero; otherwise at least 1, so small pages
    /// keep a certified slot.
    pub fn boost_cap(&self, page_size: usize) -> usize {
        let fraction = self.boost_fraction.clamp(0.0, 1.0);
        if fraction <= 0.0 {
            return 0;
        }
        let cap = (page_size as f64 * fraction).floor() as usize;
        cap.max(1).min(page_size)
    }
}

/// Ranked page before safety filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedPage {
    pub items: Vec<Publication>,
    /// `None` once both cohorts are exhausted
    pub next_cursor: Option<FeedCursor>,
}

/// Compose one page from cohort candidates.
///
/// Candidates may hold one extra row beyond what fits; its presence is how
/// a cohort is known to continue.
pub fn compose_page(
    cursor: FeedCursor,
    page_size: usize,
    boost_cap: usize,
    mut certified: Vec<Publication>,
    mut regular: Vec<Publication>,
) -> RankedPage {
    if boost_cap == 0 {
        return merge_page(cursor, page_size, certified, regular);
    }

    certified.sort_by(|a, b| FeedPosition::of(a).feed_cmp(&FeedPosition::of(b)));
    regular.sort_by(|a, b| FeedPosition::of(a).feed_cmp(&FeedPosition::of(b)));

    let certified_taken = certified.len().min(boost_cap).min(page_size);
    let certified_more = certified.len() > certified_taken;
    certified.truncate(certified_taken);

    let regular_slots = page_size - certified_taken;
    let regular_taken = regular.len().min(regular_slots);
    let regular_more = regular.len() > regular_taken;
    regular.truncate(regular_taken);

    let mut next = cursor;
    if let Some(last) = certified.last() {
        next.advance(Cohort::Certified, FeedPosition::of(last));
    }
    if let Some(last) = regular.last() {
        next.advance(Cohort::Regular, FeedPosition::of(last));
    }

    let mut items = certified;
    items.append(&mut regular);

    RankedPage {
        items,
        next_cursor: (certified_more || regular_more).then_some(next),
    }
}

/// Both cohorts interleaved by recency, each cursor advanced past what it gave.
fn merge_page(
    cursor: FeedCursor,
    page_size: usize,
    certified: Vec<Publication>,
    regular: Vec<Publication>,
) -> RankedPage {
    let mut items = certified;
    items.extend(regular);
    items.sort_by(|a, b| FeedPosition::of(a).feed_cmp(&FeedPosition::of(b)));

    let more = items.len() > page_size;
    items.truncate(page_size);

    let mut next = cursor;
    for item in &items {
        next.advance(Cohort::of(item), FeedPosition::of(item));
    }

    RankedPage {
        items,
        next_cursor: more.then_some(next),
    }
}

/// Read both cohorts after `cursor` and compose a page of `page_size`.
pub async fn rank_page(
    store: &dyn FeedStore,
    config: &RankingConfig,
    cursor: FeedCursor,
    page_size: usize,
) -> FeedResult<RankedPage> {
    let boost_cap = config.boost_cap(page_size);
    let certified_limit = if boost_cap == 0 { page_size } else { boost_cap };

    let certified = store
        .fetch_cohort(
            Cohort::Certified,
            cursor.position(Cohort::Certified),
            certified_limit + 1,
        )
        .await?;
    let certified_used = if boost_cap == 0 {
        0
    } else {
        certified.len().min(boost_cap)
    };

    let regular = store
        .fetch_cohort(
            Cohort::Regular,
            cursor.position(Cohort::Regular),
            page_size - certified_used + 1,
        )
        .await?;

    debug!(
        page_size,
        boost_cap,
        certified_candidates = certified.len(),
        regular_candidates = regular.len(),
        "Ranking feed page"
    );

    Ok(compose_page(cursor, page_size, boost_cap, certified, regular))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};
    use emploi_models::AuthorProfile;

    fn post(id: i64, certified: bool, minutes_ago: i64, now: DateTime<Utc>) -> Publication {
        Publication::new(
            id,
            AuthorProfile::new(100 + id).certified(certified),
            "content",
            now - Duration::minutes(minutes_ago),
        )
    }

    #[test]
    fn test_boost_cap_bounds() {
        let config = RankingConfig::default();
        assert_eq!(config.boost_cap(20), 5);
        assert_eq!(config.boost_cap(3), 1);
        assert_eq!(config.boost_cap(1), 1);

        let zero = RankingConfig {
            boost_fraction: 0.0,
            ..Default::default()
        };
        assert_eq!(zero.boost_cap(20), 0);
        assert_eq!(zero.boost_cap(1), 0);

        let negative = RankingConfig {
            boost_fraction: -0.5,
            ..Default::default()
        };
        assert_eq!(negative.boost_cap(20), 0);

        let all = RankingConfig {
            boost_fraction: 4.0,
            ..Default::default()
        };
        assert_eq!(all.boost_cap(20), 20);
    }

    #[test]
    fn test_page_size_is_clamped() {
        let config = RankingConfig::default();
        assert_eq!(config.page_size(None), 20);
        assert_eq!(config.page_size(Some(0)), 1);
        assert_eq!(config.page_size(Some(500)), 100);
    }

    #[test]
    fn test_certified_window_leads_then_recency() {
        let now = Utc::now();
        let certified = vec![post(1, true, 30, now), post(2, true, 5, now), post(3, true, 60, now)];
        let regular = vec![post(10, false, 1, now), post(11, false, 2, now), post(12, false, 3, now)];

        let page = compose_page(FeedCursor::start(), 4, 2, certified, regular);
        let ids: Vec<_> = page.items.iter().map(|p| p.id).collect();

        assert_eq!(ids, vec![2, 1, 10, 11]);
        let next = page.next_cursor.unwrap();
        assert_eq!(next.certified.unwrap().id, 1);
        assert_eq!(next.regular.unwrap().id, 11);
    }

    #[test]
    fn test_certified_never_exceed_cap_when_regular_exhausted() {
        let now = Utc::now();
        let certified: Vec<_> = (1..=10).map(|i| post(i, true, i, now)).collect();

        let page = compose_page(FeedCursor::start(), 10, 3, certified, Vec::new());

        assert_eq!(page.items.len(), 3);
        assert!(page.items.iter().all(|p| p.is_certified()));
        assert!(page.next_cursor.is_some());
    }

    #[test]
    fn test_equal_timestamps_break_ties_by_lower_id() {
        let now = Utc::now();
        let regular = vec![post(9, false, 0, now), post(4, false, 0, now), post(6, false, 0, now)];

        let page = compose_page(FeedCursor::start(), 10, 1, Vec::new(), regular);
        let ids: Vec<_> = page.items.iter().map(|p| p.id).collect();

        assert_eq!(ids, vec![4, 6, 9]);
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn test_zero_cap_merges_cohorts_by_recency() {
        let now = Utc::now();
        let certified = vec![post(1, true, 30, now), post(2, true, 5, now), post(3, true, 1, now)];
        let regular = vec![post(10, false, 2, now), post(11, false, 10, now), post(12, false, 40, now)];

        let page = compose_page(FeedCursor::start(), 4, 0, certified, regular);
        let ids: Vec<_> = page.items.iter().map(|p| p.id).collect();

        assert_eq!(ids, vec![3, 10, 2, 11]);
        let next = page.next_cursor.unwrap();
        assert_eq!(next.certified.unwrap().id, 2);
        assert_eq!(next.regular.unwrap().id, 11);
    }

    #[test]
    fn test_zero_cap_ends_when_both_cohorts_fit() {
        let now = Utc::now();
        let certified = vec![post(1, true, 3, now)];
        let regular = vec![post(10, false, 1, now)];

        let page = compose_page(FeedCursor::start(), 5, 0, certified, regular);

        assert_eq!(page.items.len(), 2);
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn test_exhausted_cohorts_end_pagination() {
        let page = compose_page(FeedCursor::start(), 20, 5, Vec::new(), Vec::new());
        assert!(page.items.is_empty());
        assert!(page.next_cursor.is_none());
    }
}
