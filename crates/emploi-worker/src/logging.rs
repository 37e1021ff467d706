//! Structured job logging.

use std::time::Instant;

use tracing::{error, info, warn, Span};

use emploi_models::{JobId, JobType};

/// Logs job lifecycle events with the job id and type attached.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    job_type: JobType,
    attempt: u32,
    started: Instant,
}

impl JobLogger {
    pub fn new(job_id: &JobId, job_type: JobType, attempt: u32) -> Self {
        Self {
            job_id: job_id.to_string(),
            job_type,
            attempt,
            started: Instant::now(),
        }
    }

    pub fn log_start(&self) {
        info!(
            job_id = %self.job_id,
            job_type = self.job_type.as_str(),
            attempt = self.attempt,
            "Job started"
        );
    }

    pub fn log_completion(&self) {
        info!(
            job_id = %self.job_id,
            job_type = self.job_type.as_str(),
            attempt = self.attempt,
            duration_ms = self.elapsed_ms(),
            "Job completed"
        );
    }

    pub fn log_retry(&self, error: &str, retry_at: &str) {
        warn!(
            job_id = %self.job_id,
            job_type = self.job_type.as_str(),
            attempt = self.attempt,
            retry_at,
            "Job failed, retry scheduled: {}", error
        );
    }

    pub fn log_permanent_failure(&self, error: &str) {
        error!(
            job_id = %self.job_id,
            job_type = self.job_type.as_str(),
            attempt = self.attempt,
            "Job failed permanently: {}", error
        );
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn job_type(&self) -> JobType {
        self.job_type
    }

    /// Span carrying the job context for everything logged by the processor.
    pub fn span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            job_type = self.job_type.as_str(),
            attempt = self.attempt
        )
    }
}
