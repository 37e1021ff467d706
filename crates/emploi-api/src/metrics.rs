//! Prometheus metrics for the API server.

use std::sync::LazyLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use regex_lite::Regex;

/// Install the Prometheus recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "emploi_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "emploi_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "emploi_http_requests_in_flight";

    // Feed metrics
    pub const FEED_ITEMS_SERVED_TOTAL: &str = "emploi_feed_items_served_total";

    // Queue metrics
    pub const QUEUE_LENGTH: &str = "emploi_queue_length";
    pub const QUEUE_DELAYED_LENGTH: &str = "emploi_queue_delayed_length";
    pub const QUEUE_DLQ_LENGTH: &str = "emploi_queue_dlq_length";
    pub const JOBS_ENQUEUED_TOTAL: &str = "emploi_jobs_enqueued_total";
    pub const ENQUEUE_FAILURES_TOTAL: &str = "emploi_enqueue_failures_total";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "emploi_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_feed_items(count: usize) {
    counter!(names::FEED_ITEMS_SERVED_TOTAL).increment(count as u64);
}

/// Update queue depth gauges.
pub fn set_queue_depths(stream: u64, delayed: u64, dead_letter: u64) {
    gauge!(names::QUEUE_LENGTH).set(stream as f64);
    gauge!(names::QUEUE_DELAYED_LENGTH).set(delayed as f64);
    gauge!(names::QUEUE_DLQ_LENGTH).set(dead_letter as f64);
}

/// Record job enqueued.
pub fn record_job_enqueued(job_type: &str) {
    let labels = [("type", job_type.to_string())];
    counter!(names::JOBS_ENQUEUED_TOTAL, &labels).increment(1);
}

/// Record a webhook that could not enqueue its job.
pub fn record_enqueue_failure(job_type: &str, reason: &str) {
    let labels = [("type", job_type.to_string()), ("reason", reason.to_string())];
    counter!(names::ENQUEUE_FAILURES_TOTAL, &labels).increment(1);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", sanitize_path(endpoint))];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

static UUID_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}")
        .expect("valid uuid pattern")
});

static NUMERIC_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/[0-9]+(/|$)").expect("valid numeric pattern")
});

/// Sanitize path for metrics labels (remove IDs).
fn sanitize_path(path: &str) -> String {
    let path = UUID_SEGMENT.replace_all(path, ":id");
    let path = NUMERIC_SEGMENT.replace_all(&path, "/:id$1");
    path.to_string()
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    record_http_request(&method, &path, response.status().as_u16(), start.elapsed().as_secs_f64());

    response
}
