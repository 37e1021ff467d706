//! Job executor.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use emploi_models::FailureOutcome;
use emploi_queue::{ClaimedJob, JobQueue, QueueError};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::processor::{process_job, ProcessingContext};

/// Claims jobs from the queue and runs them with bounded concurrency.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    ctx: Arc<ProcessingContext>,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    pub fn new(config: WorkerConfig, queue: Arc<JobQueue>, ctx: Arc<ProcessingContext>) -> Self {
        let config = config.fit_to_visibility(queue.config().visibility_timeout);
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        let (shutdown, _) = watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            queue,
            ctx,
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    /// Run until `shutdown` is called, then wait for in-flight jobs.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with {} max concurrent jobs",
            self.consumer_name, self.config.max_concurrent_jobs
        );

        self.queue.init().await?;

        let reclaim_task = self.spawn_reclaimer();
        let promote_task = self.spawn_promoter();

        let mut shutdown_rx = self.shutdown.subscribe();
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    if let Err(e) = result {
                        error!("Error consuming jobs: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        reclaim_task.abort();
        promote_task.abort();

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            // Unacked claims are picked up by another worker once they expire
            warn!(
                "Shutdown timeout after {:?}, abandoning in-flight jobs",
                self.config.shutdown_timeout
            );
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Periodically take over claims left behind by crashed workers.
    fn spawn_reclaimer(&self) -> tokio::task::JoinHandle<()> {
        let queue = Arc::clone(&self.queue);
        let ctx = Arc::clone(&self.ctx);
        let semaphore = Arc::clone(&self.job_semaphore);
        let consumer_name = self.consumer_name.clone();
        let interval_every = self.config.reclaim_interval;
        let batch = self.config.claim_batch;
        let job_timeout = self.config.job_timeout;
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(interval_every);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        match queue.reclaim_expired(&consumer_name, batch).await {
                            Ok(jobs) if !jobs.is_empty() => {
                                info!("Reclaimed {} expired jobs", jobs.len());
                                metrics::record_jobs_reclaimed(jobs.len());
                                for claimed in jobs {
                                    let Ok(permit) = semaphore.clone().acquire_owned().await else {
                                        break;
                                    };
                                    let ctx = Arc::clone(&ctx);
                                    let queue = Arc::clone(&queue);
                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        Self::execute_job(ctx, queue, claimed, job_timeout).await;
                                    });
                                }
                            }
                            Ok(_) => {}
                            Err(e) => warn!("Failed to reclaim expired jobs: {}", e),
                        }
                    }
                }
            }
        })
    }

    /// Move due retries back onto the stream and refresh depth gauges.
    fn spawn_promoter(&self) -> tokio::task::JoinHandle<()> {
        let queue = Arc::clone(&self.queue);
        let interval_every = self.config.promote_interval;
        let batch = self.config.promote_batch;
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(interval_every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        match queue.promote_due(Utc::now(), batch).await {
                            Ok(moved) => {
                                if moved > 0 {
                                    metrics::record_jobs_promoted(moved);
                                }
                            }
                            Err(e) => warn!("Failed to promote delayed jobs: {}", e),
                        }
                        match queue.stats().await {
                            Ok(stats) => metrics::set_queue_depths(stats.stream, stats.delayed, stats.dead_letter),
                            Err(e) => debug!("Failed to read queue depths: {}", e),
                        }
                    }
                }
            }
        })
    }

    /// Claim as many new jobs as there are free slots.
    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let jobs = self
            .queue
            .claim(
                &self.consumer_name,
                available.min(self.config.claim_batch.max(1)),
                self.config.claim_block.as_millis() as u64,
            )
            .await?;

        if jobs.is_empty() {
            return Ok(());
        }
        debug!("Claimed {} jobs from queue", jobs.len());

        for claimed in jobs {
            let ctx = Arc::clone(&self.ctx);
            let queue = Arc::clone(&self.queue);
            let job_timeout = self.config.job_timeout;
            let permit = self
                .job_semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::permanent("Semaphore closed"))?;

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_job(ctx, queue, claimed, job_timeout).await;
            });
        }

        Ok(())
    }

    /// Run one claimed job and record its outcome on the queue.
    async fn execute_job(
        ctx: Arc<ProcessingContext>,
        queue: Arc<JobQueue>,
        claimed: ClaimedJob,
        job_timeout: Duration,
    ) {
        let logger = JobLogger::new(claimed.job_id(), claimed.job.job_type(), claimed.attempt);
        let job_type = logger.job_type();
        logger.log_start();

        let result = match tokio::time::timeout(job_timeout, process_job(&ctx, &claimed.job))
            .instrument(logger.span())
            .await
        {
            Ok(result) => result,
            Err(_) => Err(WorkerError::transient(format!(
                "timed out after {}s",
                job_timeout.as_secs()
            ))),
        };

        match result {
            Ok(()) => {
                match queue.complete(&claimed).await {
                    Ok(()) => {}
                    Err(QueueError::StaleClaim(reason)) => {
                        warn!(job_id = %claimed.job_id(), "Result dropped: {}", reason);
                        return;
                    }
                    Err(e) => {
                        error!(job_id = %claimed.job_id(), "Failed to complete job: {}", e);
                        return;
                    }
                }
                logger.log_completion();
                metrics::record_job_completed(job_type.as_str(), logger.elapsed_ms() as f64 / 1000.0);
            }
            Err(e) => {
                let message = e.to_string();
                match queue.fail(&claimed, &message, e.is_retryable()).await {
                    Ok(FailureOutcome::Retry { retry_at, .. }) => {
                        logger.log_retry(&message, &retry_at.to_rfc3339());
                        metrics::record_job_retried(job_type.as_str());
                    }
                    Ok(FailureOutcome::Permanent { .. }) => {
                        logger.log_permanent_failure(&message);
                        metrics::record_job_failed(job_type.as_str());
                    }
                    Err(QueueError::StaleClaim(reason)) => {
                        warn!(job_id = %claimed.job_id(), "Failure dropped: {}", reason);
                    }
                    Err(qe) => {
                        // The claim stays pending and is reclaimed after it expires
                        error!(job_id = %claimed.job_id(), "Failed to record job failure: {}", qe);
                    }
                }
            }
        }
    }

    async fn wait_for_jobs(&self) {
        let total = self.config.max_concurrent_jobs.max(1);
        while self.job_semaphore.available_permits() < total {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
