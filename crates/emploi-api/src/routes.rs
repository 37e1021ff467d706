//! API routes.

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::admin::get_queue_status;
use crate::handlers::feed::get_newsfeed;
use crate::handlers::jobs::{cancel_job, get_job_status};
use crate::handlers::webhooks::{analyze_job_posting, moderate_post, score_activity};
use crate::handlers::{health, ready};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, rate_limit_middleware, request_id, request_logging, security_headers,
    RateLimiterCache,
};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let feed_routes = Router::new().route("/newsfeed", get(get_newsfeed));

    // Webhook triggers (shared secret)
    let webhook_routes = Router::new()
        .route("/jobs/analyze", post(analyze_job_posting))
        .route("/posts/moderate", post(moderate_post))
        .route("/activity/score", post(score_activity));

    let job_routes = Router::new()
        .route("/jobs/:job_id/status", get(get_job_status))
        .route("/jobs/:job_id/cancel", post(cancel_job))
        .route("/admin/queue/status", get(get_queue_status));

    let rate_limiter = Arc::new(RateLimiterCache::new(
        state.config.rate_limit_rps,
        state.config.rate_limit_burst,
    ));

    let api_routes = Router::new()
        .merge(feed_routes)
        .merge(webhook_routes)
        .merge(job_routes)
        .layer(middleware::from_fn_with_state(rate_limiter, rate_limit_middleware));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_logging))
        .layer(middleware::from_fn(request_id))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::Value;
    use tower::ServiceExt;

    use emploi_feed::{LexiconDetector, RankingConfig};
    use emploi_models::{AuthorProfile, JobId, JobRecord, JobState, Publication};
    use emploi_queue::{JobDispatcher, OperatorAlert, QueueError, QueueJob, QueueResult, QueueStats};
    use emploi_store::MemoryStore;

    use crate::auth::Claims;
    use crate::config::ApiConfig;

    const JWT_SECRET: &str = "jwt-test-secret";
    const WEBHOOK_SECRET: &str = "hook-test-secret";

    #[derive(Default)]
    struct RecordingDispatcher {
        jobs: Mutex<Vec<QueueJob>>,
        stall: bool,
    }

    #[async_trait]
    impl JobDispatcher for RecordingDispatcher {
        async fn dispatch(&self, job: QueueJob) -> QueueResult<JobId> {
            if self.stall {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            job.validate()?;
            let id = job.job_id().clone();
            self.jobs.lock().unwrap().push(job);
            Ok(id)
        }

        async fn job_status(&self, job_id: &JobId) -> QueueResult<JobRecord> {
            let jobs = self.jobs.lock().unwrap();
            jobs.iter()
                .find(|j| j.job_id() == job_id)
                .map(|j| JobRecord::new(j.job_id().clone(), j.job_type(), 3))
                .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))
        }

        async fn cancel_job(&self, _job_id: &JobId) -> QueueResult<bool> {
            Ok(true)
        }

        async fn queue_stats(&self) -> QueueResult<QueueStats> {
            Ok(QueueStats {
                stream: self.jobs.lock().unwrap().len() as u64,
                delayed: 0,
                dead_letter: 0,
            })
        }

        async fn check(&self) -> QueueResult<()> {
            Ok(())
        }

        async fn raise_alert(&self, _alert: &OperatorAlert) -> QueueResult<()> {
            Ok(())
        }
    }

    fn config() -> ApiConfig {
        ApiConfig {
            jwt_secret: JWT_SECRET.to_string(),
            webhook_secret: WEBHOOK_SECRET.to_string(),
            enqueue_timeout: Duration::from_millis(100),
            rate_limit_rps: 1000,
            rate_limit_burst: 1000,
            ..Default::default()
        }
    }

    fn app(store: Arc<MemoryStore>, dispatcher: Arc<RecordingDispatcher>) -> Router {
        let detector = LexiconDetector::with_words(["arnaque"]).unwrap();
        let state = AppState::from_parts(
            config(),
            store,
            Arc::new(detector),
            dispatcher,
            RankingConfig::default(),
        );
        create_router(state, None)
    }

    fn bearer(user_id: i64) -> String {
        let claims = Claims {
            sub: user_id.to_string(),
            exp: Utc::now().timestamp() + 600,
            iat: None,
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(JWT_SECRET.as_bytes()))
            .unwrap();
        format!("Bearer {token}")
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn webhook(uri: &str, body: &str, secret: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(secret) = secret {
            builder = builder.header("x-webhook-secret", secret);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_webhook_without_secret_is_unauthorized() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let app = app(Arc::new(MemoryStore::new()), dispatcher.clone());

        let response = app
            .clone()
            .oneshot(webhook("/api/jobs/analyze", r#"{"jobId":42}"#, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(webhook("/api/jobs/analyze", r#"{"jobId":42}"#, Some("wrong")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(json_body(response).await["detail"].is_string());
        assert!(dispatcher.jobs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_webhook_enqueues_and_returns_pending() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let app = app(Arc::new(MemoryStore::new()), dispatcher.clone());

        let response = app
            .clone()
            .oneshot(webhook("/api/jobs/analyze", r#"{"jobId":42}"#, Some(WEBHOOK_SECRET)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "pending");
        let job_id = body["jobId"].as_str().unwrap().to_string();

        {
            let jobs = dispatcher.jobs.lock().unwrap();
            assert_eq!(jobs.len(), 1);
            match &jobs[0] {
                QueueJob::JobAnalysis(j) => assert_eq!(j.job_posting_id, 42),
                other => panic!("unexpected job: {other:?}"),
            }
        }

        let status = Request::builder()
            .uri(format!("/api/jobs/{job_id}/status"))
            .header("x-webhook-secret", WEBHOOK_SECRET)
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(status).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], JobState::Pending.as_str());
    }

    #[tokio::test]
    async fn test_webhook_rejects_invalid_ids() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let app = app(Arc::new(MemoryStore::new()), dispatcher.clone());

        let response = app
            .oneshot(webhook("/api/posts/moderate", r#"{"publicationId":0}"#, Some(WEBHOOK_SECRET)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(dispatcher.jobs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stalled_queue_returns_service_unavailable() {
        let dispatcher = Arc::new(RecordingDispatcher {
            stall: true,
            ..Default::default()
        });
        let app = app(Arc::new(MemoryStore::new()), dispatcher);

        let response = app
            .oneshot(webhook("/api/activity/score", r#"{"userId":3}"#, Some(WEBHOOK_SECRET)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_newsfeed_requires_token() {
        let app = app(Arc::new(MemoryStore::new()), Arc::new(RecordingDispatcher::default()));
        let response = app
            .oneshot(Request::builder().uri("/api/newsfeed").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_newsfeed_serves_filtered_page() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        store
            .insert_publication(Publication::new(1, AuthorProfile::new(10), "Bonjour", now))
            .await;
        store
            .insert_publication(Publication::new(
                2,
                AuthorProfile::new(11),
                "Une arnaque évidente",
                now - chrono::Duration::minutes(1),
            ))
            .await;
        store.block(99, 12).await;
        store
            .insert_publication(Publication::new(
                3,
                AuthorProfile::new(12),
                "Bloqué",
                now - chrono::Duration::minutes(2),
            ))
            .await;

        let app = app(store, Arc::new(RecordingDispatcher::default()));
        let request = Request::builder()
            .uri("/api/newsfeed?limit=10")
            .header("authorization", bearer(99))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));

        let body = json_body(response).await;
        let items = body["items"].as_array().unwrap();
        let ids: Vec<i64> = items.iter().map(|i| i["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(items[0]["moderation"]["state"], "clean");
        assert_eq!(items[1]["moderation"]["state"], "flagged");
        assert!(body["nextCursor"].is_null());
    }

    #[tokio::test]
    async fn test_malformed_cursor_is_bad_request() {
        let app = app(Arc::new(MemoryStore::new()), Arc::new(RecordingDispatcher::default()));
        let request = Request::builder()
            .uri("/api/newsfeed?cursor=garbage!!")
            .header("authorization", bearer(1))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_ready_reports_store_outage() {
        let store = Arc::new(MemoryStore::new());
        store.set_unavailable(true);
        let app = app(store, Arc::new(RecordingDispatcher::default()));

        let response = app
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json_body(response).await;
        assert_eq!(body["checks"]["redis"]["status"], "ok");
        assert_eq!(body["checks"]["database"]["status"], "error");
    }
}
