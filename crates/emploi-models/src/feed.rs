//! Feed positions for keyset pagination.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::publication::{Publication, PublicationId};

/// Ranking cohort a publication belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cohort {
    /// Posts by certified authors (boosted into the leading window)
    Certified,
    /// Everything else
    Regular,
}

impl Cohort {
    pub fn of(publication: &Publication) -> Self {
        if publication.is_certified() {
            Cohort::Certified
        } else {
            Cohort::Regular
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Cohort::Certified => "certified",
            Cohort::Regular => "regular",
        }
    }
}

/// Position of a publication in recency order.
///
/// Feed order is `created_at` descending, then lower id first. A position
/// marks the last publication already served; the next page starts strictly
/// after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedPosition {
    pub created_at: DateTime<Utc>,
    pub id: PublicationId,
}

impl FeedPosition {
    pub fn new(created_at: DateTime<Utc>, id: PublicationId) -> Self {
        Self { created_at, id }
    }

    pub fn of(publication: &Publication) -> Self {
        Self::new(publication.created_at, publication.id)
    }

    /// Compare two positions in feed order (`Less` means served earlier).
    pub fn feed_cmp(&self, other: &Self) -> Ordering {
        other
            .created_at
            .cmp(&self.created_at)
            .then_with(|| self.id.cmp(&other.id))
    }

    /// Whether `self` comes strictly after `position` in feed order.
    pub fn is_after(&self, position: &FeedPosition) -> bool {
        self.feed_cmp(position) == Ordering::Greater
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_newer_comes_first_and_lower_id_breaks_ties() {
        let now = Utc::now();
        let newer = FeedPosition::new(now, 10);
        let older = FeedPosition::new(now - Duration::minutes(5), 1);
        let tie_low = FeedPosition::new(now, 3);

        assert_eq!(newer.feed_cmp(&older), Ordering::Less);
        assert_eq!(tie_low.feed_cmp(&newer), Ordering::Less);
        assert!(older.is_after(&newer));
        assert!(newer.is_after(&tie_low));
        assert!(!newer.is_after(&newer));
    }
}
