//! In-process store used by tests and local development.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use emploi_models::{
    ActivityCounts, ActivityKind, ActivityScore, AuthorProfile, Cohort, DeliveryReport,
    FeedPosition, JobPosting, JobPostingAnalysis, ModerationStatus, Publication, PublicationId,
    RecipientOutcome, UserId, ViewerContext,
};

use crate::error::{StoreError, StoreResult};
use crate::repo::{FeedStore, WorkStore};

#[derive(Default)]
struct Inner {
    users: HashMap<UserId, AuthorProfile>,
    publications: HashMap<PublicationId, Publication>,
    /// (blocker, blocked)
    blocks: HashSet<(UserId, UserId)>,
    connections: HashMap<UserId, HashSet<UserId>>,
    activity: Vec<(UserId, ActivityKind, DateTime<Utc>)>,
    job_postings: HashMap<i64, JobPosting>,
    analyses: HashMap<i64, JobPostingAnalysis>,
    scores: HashMap<UserId, ActivityScore>,
    deliveries: HashMap<(String, UserId), RecipientOutcome>,
}

/// Store that keeps everything in memory behind an async lock.
///
/// Publications are stored with the author profile current at insert time;
/// `update_user` propagates later profile changes.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with `Unavailable` until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".to_string()));
        }
        Ok(())
    }

    /// Insert or replace a user profile, refreshing their publications.
    pub async fn update_user(&self, profile: AuthorProfile) {
        let mut inner = self.inner.write().await;
        for publication in inner.publications.values_mut() {
            if publication.author.id == profile.id {
                publication.author = profile.clone();
            }
        }
        inner.users.insert(profile.id, profile);
    }

    pub async fn insert_publication(&self, publication: Publication) {
        let mut inner = self.inner.write().await;
        inner
            .users
            .entry(publication.author.id)
            .or_insert_with(|| publication.author.clone());
        inner.publications.insert(publication.id, publication);
    }

    pub async fn block(&self, blocker: UserId, blocked: UserId) {
        self.inner.write().await.blocks.insert((blocker, blocked));
    }

    /// Record an accepted connection in both directions.
    pub async fn connect(&self, a: UserId, b: UserId) {
        let mut inner = self.inner.write().await;
        inner.connections.entry(a).or_default().insert(b);
        inner.connections.entry(b).or_default().insert(a);
    }

    pub async fn record_activity(&self, user_id: UserId, kind: ActivityKind, at: DateTime<Utc>) {
        self.inner.write().await.activity.push((user_id, kind, at));
    }

    pub async fn insert_job_posting(&self, posting: JobPosting) {
        self.inner.write().await.job_postings.insert(posting.id, posting);
    }

    pub async fn job_analysis(&self, job_posting_id: i64) -> Option<JobPostingAnalysis> {
        self.inner.read().await.analyses.get(&job_posting_id).cloned()
    }

    pub async fn activity_score(&self, user_id: UserId) -> Option<ActivityScore> {
        self.inner.read().await.scores.get(&user_id).cloned()
    }

    /// Delivery outcomes recorded for one batch, ordered by recipient.
    pub async fn deliveries(&self, batch_id: &str) -> Vec<RecipientOutcome> {
        let inner = self.inner.read().await;
        let mut outcomes: Vec<_> = inner
            .deliveries
            .iter()
            .filter(|((batch, _), _)| batch == batch_id)
            .map(|(_, outcome)| outcome.clone())
            .collect();
        outcomes.sort_by_key(|o| o.recipient_id);
        outcomes
    }
}

#[async_trait]
impl FeedStore for MemoryStore {
    async fn fetch_cohort(
        &self,
        cohort: Cohort,
        after: Option<FeedPosition>,
        limit: usize,
    ) -> StoreResult<Vec<Publication>> {
        self.check()?;
        let inner = self.inner.read().await;

        let mut rows: Vec<&Publication> = inner
            .publications
            .values()
            .filter(|p| p.is_servable() && Cohort::of(p) == cohort)
            .filter(|p| match &after {
                Some(position) => FeedPosition::of(p).is_after(position),
                None => true,
            })
            .collect();
        rows.sort_by(|a, b| FeedPosition::of(a).feed_cmp(&FeedPosition::of(b)));

        Ok(rows.into_iter().take(limit).cloned().collect())
    }

    async fn viewer_context(&self, viewer_id: UserId) -> StoreResult<ViewerContext> {
        self.check()?;
        let inner = self.inner.read().await;

        let blocked = inner.blocks.iter().filter_map(|(blocker, blocked)| {
            if *blocker == viewer_id {
                Some(*blocked)
            } else if *blocked == viewer_id {
                Some(*blocker)
            } else {
                None
            }
        });
        let connections = inner
            .connections
            .get(&viewer_id)
            .cloned()
            .unwrap_or_default();

        Ok(ViewerContext::new(viewer_id)
            .with_blocked(blocked.collect::<Vec<_>>())
            .with_connections(connections))
    }

    async fn ping(&self) -> StoreResult<()> {
        self.check()
    }
}

#[async_trait]
impl WorkStore for MemoryStore {
    async fn publication(&self, id: PublicationId) -> StoreResult<Publication> {
        self.check()?;
        self.inner
            .read()
            .await
            .publications
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("publication {}", id)))
    }

    async fn set_moderation(
        &self,
        id: PublicationId,
        status: ModerationStatus,
        reason: Option<&str>,
    ) -> StoreResult<()> {
        self.check()?;
        let mut inner = self.inner.write().await;
        let publication = inner
            .publications
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(format!("publication {}", id)))?;
        publication.moderation_status = status;
        publication.moderation_reason = reason.map(str::to_string);
        Ok(())
    }

    async fn job_posting(&self, id: i64) -> StoreResult<JobPosting> {
        self.check()?;
        self.inner
            .read()
            .await
            .job_postings
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("job posting {}", id)))
    }

    async fn save_job_analysis(&self, analysis: &JobPostingAnalysis) -> StoreResult<()> {
        self.check()?;
        self.inner
            .write()
            .await
            .analyses
            .insert(analysis.job_posting_id, analysis.clone());
        Ok(())
    }

    async fn activity_counts(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> StoreResult<ActivityCounts> {
        self.check()?;
        let inner = self.inner.read().await;
        if !inner.users.contains_key(&user_id) {
            return Err(StoreError::not_found(format!("user {}", user_id)));
        }

        let mut counts = ActivityCounts::default();
        for (_, kind, _) in inner
            .activity
            .iter()
            .filter(|(user, _, at)| *user == user_id && *at >= since)
        {
            counts.record(*kind);
        }
        Ok(counts)
    }

    async fn save_activity_score(&self, score: &ActivityScore) -> StoreResult<()> {
        self.check()?;
        self.inner
            .write()
            .await
            .scores
            .insert(score.user_id, score.clone());
        Ok(())
    }

    async fn record_deliveries(&self, report: &DeliveryReport) -> StoreResult<()> {
        self.check()?;
        let mut inner = self.inner.write().await;
        for outcome in &report.outcomes {
            inner.deliveries.insert(
                (report.batch_id.clone(), outcome.recipient_id),
                outcome.clone(),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn publication(id: i64, author: AuthorProfile, minutes_ago: i64, now: DateTime<Utc>) -> Publication {
        Publication::new(id, author, format!("post {}", id), now - Duration::minutes(minutes_ago))
    }

    #[tokio::test]
    async fn test_fetch_cohort_keyset_order_and_ties() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let author = AuthorProfile::new(1);

        // Two posts share a timestamp; lower id comes first.
        store.insert_publication(publication(5, author.clone(), 1, now)).await;
        store.insert_publication(publication(3, author.clone(), 1, now)).await;
        store.insert_publication(publication(9, author.clone(), 0, now)).await;
        store.insert_publication(publication(1, author.clone(), 10, now)).await;

        let first = store.fetch_cohort(Cohort::Regular, None, 2).await.unwrap();
        let ids: Vec<_> = first.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![9, 3]);

        let after = FeedPosition::of(first.last().unwrap());
        let rest = store.fetch_cohort(Cohort::Regular, Some(after), 10).await.unwrap();
        let ids: Vec<_> = rest.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![5, 1]);
    }

    #[tokio::test]
    async fn test_fetch_cohort_splits_certified_and_skips_hidden() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .insert_publication(publication(1, AuthorProfile::new(1).certified(true), 0, now))
            .await;
        store.insert_publication(publication(2, AuthorProfile::new(2), 0, now)).await;

        let mut hidden = publication(3, AuthorProfile::new(2), 0, now);
        hidden.moderation_status = ModerationStatus::Hidden;
        store.insert_publication(hidden).await;

        let certified = store.fetch_cohort(Cohort::Certified, None, 10).await.unwrap();
        let regular = store.fetch_cohort(Cohort::Regular, None, 10).await.unwrap();
        assert_eq!(certified.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1]);
        assert_eq!(regular.iter().map(|p| p.id).collect::<Vec<_>>(), vec![2]);
    }

    #[tokio::test]
    async fn test_viewer_context_blocks_both_directions() {
        let store = MemoryStore::new();
        store.block(1, 2).await;
        store.block(3, 1).await;
        store.connect(1, 4).await;

        let ctx = store.viewer_context(1).await.unwrap();
        assert!(ctx.is_blocked(2));
        assert!(ctx.is_blocked(3));
        assert!(ctx.is_connection(4));
        assert!(!ctx.is_connection(2));

        let other = store.viewer_context(4).await.unwrap();
        assert!(other.is_connection(1));
    }

    #[tokio::test]
    async fn test_activity_counts_window_and_unknown_user() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.update_user(AuthorProfile::new(7)).await;
        store.record_activity(7, ActivityKind::Comment, now).await;
        store.record_activity(7, ActivityKind::Comment, now).await;
        store
            .record_activity(7, ActivityKind::Reaction, now - Duration::days(60))
            .await;

        let counts = store.activity_counts(7, now - Duration::days(30)).await.unwrap();
        assert_eq!(counts.comments, 2);
        assert_eq!(counts.reactions, 0);

        let err = store.activity_counts(8, now).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_unavailable_toggle() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let err = store.ping().await.unwrap_err();
        assert!(err.is_transient());

        store.set_unavailable(false);
        store.ping().await.unwrap();
    }
}
