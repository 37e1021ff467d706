//! PostgreSQL implementation of the store traits.
//!
//! The schema is owned by the main application; this module only reads the
//! tables it needs and writes worker results.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info};

use emploi_models::{
    AccountStatus, ActivityCounts, ActivityScore, AuthorProfile, Cohort, DeliveryReport,
    FeedPosition, JobPosting, JobPostingAnalysis, ModerationStatus, Publication, PublicationId,
    UserId, ViewerContext, Visibility,
};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::repo::{FeedStore, WorkStore};

const PUBLICATION_COLUMNS: &str = r#"
    p.id, p.author_id, p.content, p.image_url, p.visibility, p.hashtags,
    p.created_at, p.moderation_status, p.moderation_reason, p.pinned, p.active,
    u.account_status, u.certified
"#;

#[derive(sqlx::FromRow)]
struct PublicationRow {
    id: i64,
    author_id: i64,
    content: String,
    image_url: Option<String>,
    visibility: String,
    hashtags: Vec<String>,
    created_at: DateTime<Utc>,
    moderation_status: String,
    moderation_reason: Option<String>,
    pinned: bool,
    active: bool,
    account_status: String,
    certified: bool,
}

impl TryFrom<PublicationRow> for Publication {
    type Error = StoreError;

    fn try_from(row: PublicationRow) -> Result<Self, Self::Error> {
        let visibility = Visibility::parse(&row.visibility).ok_or_else(|| {
            StoreError::decode(format!("publication {}: visibility {:?}", row.id, row.visibility))
        })?;
        let moderation_status = ModerationStatus::parse(&row.moderation_status).ok_or_else(|| {
            StoreError::decode(format!(
                "publication {}: moderation status {:?}",
                row.id, row.moderation_status
            ))
        })?;
        let account_status = AccountStatus::parse(&row.account_status).ok_or_else(|| {
            StoreError::decode(format!(
                "user {}: account status {:?}",
                row.author_id, row.account_status
            ))
        })?;

        Ok(Publication {
            id: row.id,
            author: AuthorProfile::new(row.author_id)
                .certified(row.certified)
                .with_status(account_status),
            content: row.content,
            image_url: row.image_url,
            visibility,
            hashtags: row.hashtags,
            created_at: row.created_at,
            moderation_status,
            moderation_reason: row.moderation_reason,
            pinned: row.pinned,
            active: row.active,
        })
    }
}

#[derive(sqlx::FromRow)]
struct JobPostingRow {
    id: i64,
    title: String,
    description: String,
    company: String,
    active: bool,
}

#[derive(sqlx::FromRow)]
struct ActivityRow {
    publications: i64,
    comments: i64,
    reactions: i64,
    applications: i64,
}

/// Store backed by a PostgreSQL pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect a pool and verify it with a trivial query.
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        let statement_timeout_ms = config.statement_timeout.as_millis() as i64;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    sqlx::query(&format!("SET statement_timeout = {}", statement_timeout_ms))
                        .execute(conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(&config.database_url)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;
        info!(
            max_connections = config.max_connections,
            "Connected to PostgreSQL"
        );

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl FeedStore for PgStore {
    async fn fetch_cohort(
        &self,
        cohort: Cohort,
        after: Option<FeedPosition>,
        limit: usize,
    ) -> StoreResult<Vec<Publication>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let certified = cohort == Cohort::Certified;
        let limit = limit as i64;

        // Keyset on (created_at DESC, id ASC); an absent position reads from the top.
        let sql = format!(
            r#"
            SELECT {PUBLICATION_COLUMNS}
            FROM publications p
            JOIN users u ON u.id = p.author_id
            WHERE p.active = TRUE
              AND p.moderation_status <> 'hidden'
              AND u.certified = $1
              AND ($2::timestamptz IS NULL
                   OR p.created_at < $2
                   OR (p.created_at = $2 AND p.id > $3))
            ORDER BY p.created_at DESC, p.id ASC
            LIMIT $4
            "#
        );

        let rows = sqlx::query_as::<_, PublicationRow>(&sql)
            .bind(certified)
            .bind(after.map(|p| p.created_at))
            .bind(after.map(|p| p.id).unwrap_or(0))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        debug!(cohort = cohort.as_str(), rows = rows.len(), "Fetched feed cohort");
        rows.into_iter().map(Publication::try_from).collect()
    }

    async fn viewer_context(&self, viewer_id: UserId) -> StoreResult<ViewerContext> {
        // Blocks apply in both directions.
        let blocked: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT blocked_id FROM user_blocks WHERE blocker_id = $1
            UNION
            SELECT blocker_id FROM user_blocks WHERE blocked_id = $1
            "#,
        )
        .bind(viewer_id)
        .fetch_all(&self.pool)
        .await?;

        let connections: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT CASE WHEN requester_id = $1 THEN addressee_id ELSE requester_id END
            FROM connections
            WHERE status = 'accepted' AND (requester_id = $1 OR addressee_id = $1)
            "#,
        )
        .bind(viewer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ViewerContext::new(viewer_id)
            .with_blocked(blocked)
            .with_connections(connections))
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl WorkStore for PgStore {
    async fn publication(&self, id: PublicationId) -> StoreResult<Publication> {
        let sql = format!(
            r#"
            SELECT {PUBLICATION_COLUMNS}
            FROM publications p
            JOIN users u ON u.id = p.author_id
            WHERE p.id = $1
            "#
        );
        let row = sqlx::query_as::<_, PublicationRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("publication {}", id)))?;
        row.try_into()
    }

    async fn set_moderation(
        &self,
        id: PublicationId,
        status: ModerationStatus,
        reason: Option<&str>,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE publications
            SET moderation_status = $2, moderation_reason = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(reason)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!("publication {}", id)));
        }
        Ok(())
    }

    async fn job_posting(&self, id: i64) -> StoreResult<JobPosting> {
        let row = sqlx::query_as::<_, JobPostingRow>(
            "SELECT id, title, description, company, active FROM job_postings WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found(format!("job posting {}", id)))?;

        Ok(JobPosting {
            id: row.id,
            title: row.title,
            description: row.description,
            company: row.company,
            active: row.active,
        })
    }

    async fn save_job_analysis(&self, analysis: &JobPostingAnalysis) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO job_posting_analyses (job_posting_id, skills, flagged, reason, analyzed_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (job_posting_id) DO UPDATE
            SET skills = EXCLUDED.skills,
                flagged = EXCLUDED.flagged,
                reason = EXCLUDED.reason,
                analyzed_at = EXCLUDED.analyzed_at
            "#,
        )
        .bind(analysis.job_posting_id)
        .bind(&analysis.skills)
        .bind(analysis.flagged)
        .bind(analysis.reason.as_deref())
        .bind(analysis.analyzed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn activity_counts(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> StoreResult<ActivityCounts> {
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Err(StoreError::not_found(format!("user {}", user_id)));
        }

        let row = sqlx::query_as::<_, ActivityRow>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM publications
                  WHERE author_id = $1 AND created_at >= $2) AS publications,
                (SELECT COUNT(*) FROM comments
                  WHERE author_id = $1 AND created_at >= $2) AS comments,
                (SELECT COUNT(*) FROM reactions
                  WHERE user_id = $1 AND created_at >= $2) AS reactions,
                (SELECT COUNT(*) FROM job_applications
                  WHERE applicant_id = $1 AND created_at >= $2) AS applications
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(ActivityCounts {
            publications: row.publications.max(0) as u32,
            comments: row.comments.max(0) as u32,
            reactions: row.reactions.max(0) as u32,
            applications: row.applications.max(0) as u32,
        })
    }

    async fn save_activity_score(&self, score: &ActivityScore) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO activity_scores (user_id, score, window_days, computed_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE
            SET score = EXCLUDED.score,
                window_days = EXCLUDED.window_days,
                computed_at = EXCLUDED.computed_at
            "#,
        )
        .bind(score.user_id)
        .bind(score.score)
        .bind(score.window_days as i32)
        .bind(score.computed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_deliveries(&self, report: &DeliveryReport) -> StoreResult<()> {
        if report.outcomes.is_empty() {
            return Ok(());
        }

        let recipients: Vec<i64> = report.outcomes.iter().map(|o| o.recipient_id).collect();
        let accepted: Vec<bool> = report.outcomes.iter().map(|o| o.accepted).collect();
        let reasons: Vec<Option<String>> =
            report.outcomes.iter().map(|o| o.reason.clone()).collect();

        // Re-delivering a batch after a retry overwrites earlier outcomes.
        sqlx::query(
            r#"
            INSERT INTO notification_deliveries (batch_id, recipient_id, accepted, reason, sent_at)
            SELECT $1, r.recipient_id, r.accepted, r.reason, $5
            FROM UNNEST($2::bigint[], $3::bool[], $4::text[]) AS r(recipient_id, accepted, reason)
            ON CONFLICT (batch_id, recipient_id) DO UPDATE
            SET accepted = EXCLUDED.accepted,
                reason = EXCLUDED.reason,
                sent_at = EXCLUDED.sent_at
            "#,
        )
        .bind(&report.batch_id)
        .bind(&recipients)
        .bind(&accepted)
        .bind(&reasons)
        .bind(report.sent_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
