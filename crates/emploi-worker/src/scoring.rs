//! Activity scoring.

use chrono::{Duration, Utc};
use tracing::info;

use emploi_models::{ActivityCounts, ActivityScore, UserId};

use crate::error::WorkerResult;
use crate::processor::ProcessingContext;

const PUBLICATION_WEIGHT: f64 = 5.0;
const APPLICATION_WEIGHT: f64 = 3.0;
const COMMENT_WEIGHT: f64 = 2.0;
const REACTION_WEIGHT: f64 = 1.0;

/// Weighted sum of the counters.
pub fn weighted_score(counts: &ActivityCounts) -> f64 {
    counts.publications as f64 * PUBLICATION_WEIGHT
        + counts.applications as f64 * APPLICATION_WEIGHT
        + counts.comments as f64 * COMMENT_WEIGHT
        + counts.reactions as f64 * REACTION_WEIGHT
}

/// Recompute and store a user's score over the configured window.
///
/// Recomputing from the raw counters makes a retried job write the same value.
pub async fn score_activity(ctx: &ProcessingContext, user_id: UserId) -> WorkerResult<()> {
    let window_days = ctx.config.activity_window_days;
    let now = Utc::now();
    let since = now - Duration::days(i64::from(window_days));

    let counts = ctx.store.activity_counts(user_id, since).await?;
    let score = ActivityScore {
        user_id,
        score: weighted_score(&counts),
        window_days,
        computed_at: now,
    };
    ctx.store.save_activity_score(&score).await?;

    info!(user_id, score = score.score, window_days, "Activity score updated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::testing::{harness, FakeProvider};
    use emploi_models::{ActivityKind, AuthorProfile};

    #[test]
    fn test_weights() {
        let counts = ActivityCounts {
            publications: 2,
            comments: 3,
            reactions: 4,
            applications: 1,
        };
        assert_eq!(weighted_score(&counts), 10.0 + 6.0 + 4.0 + 3.0);
        assert_eq!(weighted_score(&ActivityCounts::default()), 0.0);
    }

    #[tokio::test]
    async fn test_score_counts_only_the_window() {
        let h = harness(FakeProvider::default());
        h.store.update_user(AuthorProfile::new(5)).await;
        let now = Utc::now();
        h.store.record_activity(5, ActivityKind::Publication, now - Duration::days(1)).await;
        h.store.record_activity(5, ActivityKind::Comment, now - Duration::hours(3)).await;
        h.store.record_activity(5, ActivityKind::Reaction, now - Duration::days(45)).await;

        score_activity(&h.ctx, 5).await.unwrap();

        let stored = h.store.activity_score(5).await.unwrap();
        assert_eq!(stored.score, 7.0);
        assert_eq!(stored.window_days, 30);
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_retried() {
        let h = harness(FakeProvider::default());
        let err = tokio_test::assert_err!(score_activity(&h.ctx, 404).await);
        assert!(!err.is_retryable());
    }
}
