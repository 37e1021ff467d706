//! Worker configuration.

use std::time::Duration;

use tracing::warn;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// How long one XREADGROUP call blocks
    pub claim_block: Duration,
    /// Upper bound on jobs claimed per read
    pub claim_batch: usize,
    /// How often the worker looks for claims abandoned by crashed workers
    pub reclaim_interval: Duration,
    /// How often due retries are moved back onto the stream
    pub promote_interval: Duration,
    /// Upper bound on retries promoted per tick
    pub promote_batch: usize,
    /// Per-job timeout; a timed-out job is retried. Always below the
    /// queue's visibility timeout
    pub job_timeout: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Activity window for scoring, in days
    pub activity_window_days: u32,
    /// Skill keywords looked up in job postings
    pub skills: Vec<String>,
    /// Port of the Prometheus scrape endpoint (0 disables it)
    pub metrics_port: u16,
}

/// Skills recognized when `WORKER_SKILLS` is not set.
pub const DEFAULT_SKILLS: &[&str] = &[
    "rust",
    "python",
    "java",
    "javascript",
    "typescript",
    "react",
    "sql",
    "docker",
    "kubernetes",
    "excel",
    "comptabilité",
    "marketing",
    "vente",
    "gestion de projet",
    "service client",
    "anglais",
    "logistique",
    "ressources humaines",
];

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            claim_block: Duration::from_millis(1000),
            claim_batch: 5,
            reclaim_interval: Duration::from_secs(30),
            promote_interval: Duration::from_secs(1),
            promote_batch: 100,
            job_timeout: Duration::from_secs(120),
            shutdown_timeout: Duration::from_secs(30),
            activity_window_days: 30,
            skills: DEFAULT_SKILLS.iter().map(|s| s.to_string()).collect(),
            metrics_port: 9100,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            claim_block: Duration::from_millis(
                std::env::var("WORKER_CLAIM_BLOCK_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
            claim_batch: std::env::var("WORKER_CLAIM_BATCH")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.claim_batch),
            reclaim_interval: Duration::from_secs(
                std::env::var("WORKER_RECLAIM_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            promote_interval: Duration::from_millis(
                std::env::var("WORKER_PROMOTE_INTERVAL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
            promote_batch: std::env::var("WORKER_PROMOTE_BATCH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.promote_batch),
            job_timeout: Duration::from_secs(
                std::env::var("WORKER_JOB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            activity_window_days: std::env::var("ACTIVITY_WINDOW_DAYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &u32| *n > 0)
                .unwrap_or(defaults.activity_window_days),
            skills: std::env::var("WORKER_SKILLS")
                .map(|s| {
                    s.split(',')
                        .map(|w| w.trim().to_lowercase())
                        .filter(|w| !w.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.skills),
            metrics_port: std::env::var("WORKER_METRICS_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.metrics_port),
        }
    }

    /// Keep the job timeout below the claim visibility timeout, so a slow job
    /// is abandoned before another worker may take it over.
    pub fn fit_to_visibility(mut self, visibility_timeout: Duration) -> Self {
        if self.job_timeout >= visibility_timeout {
            let clamped = visibility_timeout / 2;
            warn!(
                "Job timeout {:?} is not below the visibility timeout {:?}, using {:?}",
                self.job_timeout, visibility_timeout, clamped
            );
            self.job_timeout = clamped;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_timeout_stays_below_visibility_timeout() {
        let config = WorkerConfig {
            job_timeout: Duration::from_secs(600),
            ..Default::default()
        }
        .fit_to_visibility(Duration::from_secs(300));
        assert_eq!(config.job_timeout, Duration::from_secs(150));

        let config = WorkerConfig {
            job_timeout: Duration::from_secs(300),
            ..Default::default()
        }
        .fit_to_visibility(Duration::from_secs(300));
        assert!(config.job_timeout < Duration::from_secs(300));

        let config = WorkerConfig::default().fit_to_visibility(Duration::from_secs(300));
        assert_eq!(config.job_timeout, Duration::from_secs(120));
    }
}
