//! Worker metrics.

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub mod names {
    pub const JOBS_COMPLETED_TOTAL: &str = "emploi_jobs_completed_total";
    pub const JOBS_RETRIED_TOTAL: &str = "emploi_jobs_retried_total";
    pub const JOBS_FAILED_TOTAL: &str = "emploi_jobs_failed_total";
    pub const JOB_DURATION_SECONDS: &str = "emploi_job_duration_seconds";
    pub const JOBS_RECLAIMED_TOTAL: &str = "emploi_jobs_reclaimed_total";
    pub const JOBS_PROMOTED_TOTAL: &str = "emploi_jobs_promoted_total";
    pub const QUEUE_LENGTH: &str = "emploi_queue_length";
    pub const QUEUE_DELAYED_LENGTH: &str = "emploi_queue_delayed_length";
    pub const QUEUE_DLQ_LENGTH: &str = "emploi_queue_dlq_length";
    pub const NOTIFICATIONS_ACCEPTED_TOTAL: &str = "emploi_notifications_accepted_total";
    pub const NOTIFICATIONS_REJECTED_TOTAL: &str = "emploi_notifications_rejected_total";
    pub const POSTS_FLAGGED_TOTAL: &str = "emploi_posts_flagged_total";
}

/// Serve Prometheus metrics on `0.0.0.0:port`.
pub fn init_metrics(port: u16) -> Result<(), BuildError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new().with_http_listener(addr).install()
}

pub fn record_job_completed(job_type: &str, duration_secs: f64) {
    let labels = [("type", job_type.to_string())];
    counter!(names::JOBS_COMPLETED_TOTAL, &labels).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_job_retried(job_type: &str) {
    let labels = [("type", job_type.to_string())];
    counter!(names::JOBS_RETRIED_TOTAL, &labels).increment(1);
}

pub fn record_job_failed(job_type: &str) {
    let labels = [("type", job_type.to_string())];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
}

pub fn record_jobs_reclaimed(count: usize) {
    counter!(names::JOBS_RECLAIMED_TOTAL).increment(count as u64);
}

pub fn record_jobs_promoted(count: u64) {
    counter!(names::JOBS_PROMOTED_TOTAL).increment(count);
}

pub fn set_queue_depths(stream: u64, delayed: u64, dead_letter: u64) {
    gauge!(names::QUEUE_LENGTH).set(stream as f64);
    gauge!(names::QUEUE_DELAYED_LENGTH).set(delayed as f64);
    gauge!(names::QUEUE_DLQ_LENGTH).set(dead_letter as f64);
}

pub fn record_deliveries(accepted: usize, rejected: usize) {
    counter!(names::NOTIFICATIONS_ACCEPTED_TOTAL).increment(accepted as u64);
    counter!(names::NOTIFICATIONS_REJECTED_TOTAL).increment(rejected as u64);
}

pub fn record_post_flagged() {
    counter!(names::POSTS_FLAGGED_TOTAL).increment(1);
}
