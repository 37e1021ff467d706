//! Job queue using Redis Streams.
//!
//! Keys:
//! - `stream_name`: jobs ready to run, read through a consumer group
//! - `delayed_set_name`: sorted set of job ids waiting for a retry, scored by due time (ms)
//! - `dlq_stream_name`: jobs that failed for good
//! - `{status_key_prefix}{job_id}`: status hash per job, expiring after a week
//!
//! Status transitions that can race (claim vs. cancel, promotion, completion
//! after a takeover) run as Lua scripts. A worker can only settle a job while
//! the status record still shows its own attempt.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use redis::{AsyncCommands, Script};
use tracing::{debug, error, info, warn};

use emploi_models::{FailureOutcome, JobId, JobRecord, JobState, JobType};

use crate::alerts::{AlertChannel, OperatorAlert, DEFAULT_ALERT_CHANNEL};
use crate::error::{QueueError, QueueResult};
use crate::job::QueueJob;
use crate::retry::RetryPolicy;

/// Job status records live for 7 days.
pub const JOB_STATUS_TTL_SECS: u64 = 7 * 24 * 3600;

const CLAIM_SCRIPT: &str = r#"
local status = redis.call('HGET', KEYS[1], 'status')
if not status then return -1 end
if status ~= 'pending' and not (ARGV[2] == '1' and status == 'active') then return -1 end
local attempts = tonumber(redis.call('HGET', KEYS[1], 'attempts') or '0')
local max = tonumber(redis.call('HGET', KEYS[1], 'max_attempts') or '1')
redis.call('HSET', KEYS[1], 'status', 'active', 'updated_at', ARGV[1])
redis.call('HDEL', KEYS[1], 'scheduled_at')
if attempts >= max then return -2 end
attempts = attempts + 1
redis.call('HSET', KEYS[1], 'attempts', attempts)
return attempts
"#;

const CANCEL_SCRIPT: &str = r#"
local status = redis.call('HGET', KEYS[1], 'status')
if not status then return -1 end
if status ~= 'pending' then return 0 end
redis.call('HSET', KEYS[1], 'status', 'failed', 'permanent', '1', 'last_error', 'cancelled', 'updated_at', ARGV[1])
redis.call('HDEL', KEYS[1], 'scheduled_at')
redis.call('ZREM', KEYS[2], ARGV[2])
return 1
"#;

// KEYS: status hash, stream, delayed set, dlq stream
// ARGV: attempt, group, message id, job id, retry score, dlq payload, dlq
// reason, ttl, count of fields to delete, those fields, then field/value pairs
const COMMIT_SCRIPT: &str = r#"
if redis.call('HGET', KEYS[1], 'status') ~= 'active' then return 0 end
if redis.call('HGET', KEYS[1], 'attempts') ~= ARGV[1] then return 0 end
local absent = tonumber(ARGV[9])
for i = 10, 9 + absent do redis.call('HDEL', KEYS[1], ARGV[i]) end
for i = 10 + absent, #ARGV, 2 do redis.call('HSET', KEYS[1], ARGV[i], ARGV[i + 1]) end
redis.call('EXPIRE', KEYS[1], tonumber(ARGV[8]))
if ARGV[5] ~= '' then redis.call('ZADD', KEYS[3], ARGV[5], ARGV[4]) end
if ARGV[6] ~= '' then
  redis.call('XADD', KEYS[4], '*', 'job_id', ARGV[4], 'job', ARGV[6], 'error', ARGV[7], 'original_id', ARGV[3])
end
redis.call('XACK', KEYS[2], ARGV[2], ARGV[3])
redis.call('XDEL', KEYS[2], ARGV[3])
return 1
"#;

const PROMOTE_SCRIPT: &str = r#"
local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, tonumber(ARGV[2]))
local moved = 0
for _, id in ipairs(ids) do
  if redis.call('ZREM', KEYS[1], id) == 1 then
    local payload = redis.call('HGET', ARGV[3] .. id, 'payload')
    if payload then
      redis.call('XADD', KEYS[2], '*', 'job_id', id, 'job', payload)
      moved = moved + 1
    end
  end
end
return moved
"#;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for jobs
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Dead letter queue stream name
    pub dlq_stream_name: String,
    /// Sorted set holding jobs waiting for a retry
    pub delayed_set_name: String,
    /// Prefix of per-job status hashes
    pub status_key_prefix: String,
    /// Pub/Sub channel for operator alerts
    pub alert_channel: String,
    /// Attempt ceiling and backoff
    pub retry: RetryPolicy,
    /// Claims idle longer than this are taken over; job timeouts stay below it
    pub visibility_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "emploi:jobs".to_string(),
            consumer_group: "emploi:workers".to_string(),
            dlq_stream_name: "emploi:dlq".to_string(),
            delayed_set_name: "emploi:delayed".to_string(),
            status_key_prefix: "emploi:job:".to_string(),
            alert_channel: DEFAULT_ALERT_CHANNEL.to_string(),
            retry: RetryPolicy::default(),
            visibility_timeout: Duration::from_secs(300), // 5 minutes
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            stream_name: std::env::var("QUEUE_STREAM").unwrap_or(defaults.stream_name),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            dlq_stream_name: std::env::var("QUEUE_DLQ_STREAM").unwrap_or(defaults.dlq_stream_name),
            delayed_set_name: std::env::var("QUEUE_DELAYED_SET")
                .unwrap_or(defaults.delayed_set_name),
            status_key_prefix: std::env::var("QUEUE_STATUS_PREFIX")
                .unwrap_or(defaults.status_key_prefix),
            alert_channel: std::env::var("QUEUE_ALERT_CHANNEL").unwrap_or(defaults.alert_channel),
            retry: RetryPolicy {
                max_attempts: std::env::var("QUEUE_MAX_ATTEMPTS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.retry.max_attempts),
                base_delay: Duration::from_millis(
                    std::env::var("QUEUE_RETRY_BASE_MS")
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(2_000),
                ),
                max_delay: Duration::from_millis(
                    std::env::var("QUEUE_RETRY_MAX_MS")
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(300_000),
                ),
            },
            visibility_timeout: Duration::from_secs(
                std::env::var("QUEUE_VISIBILITY_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
        }
    }
}

/// A job held by one consumer.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    /// Stream entry id, needed to ack
    pub message_id: String,
    pub job: QueueJob,
    /// Attempt number of this claim (1-based)
    pub attempt: u32,
}

impl ClaimedJob {
    pub fn job_id(&self) -> &JobId {
        self.job.job_id()
    }
}

/// Queue depths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub stream: u64,
    pub delayed: u64,
    pub dead_letter: u64,
}

/// Job queue client.
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
    alerts: AlertChannel,
}

impl JobQueue {
    /// Create a new job queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        let alerts = AlertChannel::new(&config.redis_url, config.alert_channel.clone())?;
        Ok(Self {
            client,
            config,
            alerts,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn alerts(&self) -> &AlertChannel {
        &self.alerts
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.retry.max_attempts.max(1)
    }

    fn status_key(&self, job_id: &str) -> String {
        format!("{}{}", self.config.status_key_prefix, job_id)
    }

    /// Initialize the queue (create consumer group if not exists).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        // Create consumer group (ignore error if already exists)
        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Round-trip to Redis for readiness checks.
    pub async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }

    /// Validate and enqueue a job; returns as soon as it is in the stream.
    pub async fn enqueue(&self, job: impl Into<QueueJob>) -> QueueResult<JobId> {
        let job = job.into();
        job.validate()?;

        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let job_id = job.job_id().clone();
        let payload = serde_json::to_string(&job)?;
        let record = JobRecord::new(job_id.clone(), job.job_type(), self.max_attempts());
        let key = self.status_key(job_id.as_str());

        let mut fields = record_fields(&record);
        fields.push(("payload", payload.clone()));

        let message_id: String = redis::pipe()
            .atomic()
            .hset_multiple(&key, &fields)
            .ignore()
            .expire(&key, JOB_STATUS_TTL_SECS as i64)
            .ignore()
            .cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg("job_id")
            .arg(job_id.as_str())
            .arg("job")
            .arg(&payload)
            .query_async::<(String,)>(&mut conn)
            .await?
            .0;

        info!(
            job_id = %job_id,
            job_type = %job.job_type(),
            message_id = %message_id,
            "Enqueued job"
        );

        Ok(job_id)
    }

    /// Consume new jobs from the queue through the consumer group.
    pub async fn claim(
        &self,
        consumer_name: &str,
        count: usize,
        block_ms: u64,
    ) -> QueueResult<Vec<ClaimedJob>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: redis::streams::StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">") // Only new messages
            .query_async(&mut conn)
            .await?;

        let mut jobs = Vec::new();
        for stream_key in result.keys {
            for entry in stream_key.ids {
                if let Some(claimed) = self.activate_entry(&mut conn, entry, false).await? {
                    jobs.push(claimed);
                }
            }
        }

        Ok(jobs)
    }

    /// Take over claims idle longer than the visibility timeout; a crashed
    /// worker's job is retried instead of stuck.
    pub async fn reclaim_expired(
        &self,
        consumer_name: &str,
        count: usize,
    ) -> QueueResult<Vec<ClaimedJob>> {
        let min_idle = self.config.visibility_timeout;
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let reply: redis::streams::StreamAutoClaimReply = redis::cmd("XAUTOCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(min_idle.as_millis() as u64)
            .arg("0-0")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        let mut jobs = Vec::new();
        for entry in reply.claimed {
            if let Some(claimed) = self.activate_entry(&mut conn, entry, true).await? {
                info!(
                    job_id = %claimed.job_id(),
                    attempt = claimed.attempt,
                    "Reclaimed expired job"
                );
                jobs.push(claimed);
            }
        }

        Ok(jobs)
    }

    /// Mark the job behind a stream entry active, or drop the entry.
    async fn activate_entry(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        entry: redis::streams::StreamId,
        reclaim: bool,
    ) -> QueueResult<Option<ClaimedJob>> {
        let message_id = entry.id.clone();

        let job = match entry.get::<String>("job").map(|p| serde_json::from_str::<QueueJob>(&p)) {
            Some(Ok(job)) => job,
            Some(Err(e)) => {
                warn!(message_id = %message_id, "Failed to parse job payload: {}", e);
                // Ack the malformed message to prevent reprocessing
                self.ack(conn, &message_id).await?;
                return Ok(None);
            }
            None => {
                warn!(message_id = %message_id, "Stream entry without job payload");
                self.ack(conn, &message_id).await?;
                return Ok(None);
            }
        };

        let key = self.status_key(job.job_id().as_str());
        let result: i64 = Script::new(CLAIM_SCRIPT)
            .key(&key)
            .arg(Utc::now().to_rfc3339())
            .arg(if reclaim { "1" } else { "0" })
            .invoke_async(conn)
            .await?;

        match result {
            attempt if attempt > 0 => {
                debug!(job_id = %job.job_id(), attempt, "Claimed job");
                Ok(Some(ClaimedJob {
                    message_id,
                    job,
                    attempt: attempt as u32,
                }))
            }
            -2 => {
                let record = self.load_record(conn, job.job_id().as_str()).await?;
                let claimed = ClaimedJob {
                    message_id,
                    job,
                    attempt: record.attempts,
                };
                self.fail(&claimed, "claim expired: worker stopped responding", true)
                    .await?;
                Ok(None)
            }
            _ => {
                // Cancelled or record expired
                debug!(job_id = %job.job_id(), "Skipping job that is no longer pending");
                self.ack(conn, &message_id).await?;
                Ok(None)
            }
        }
    }

    async fn ack(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        message_id: &str,
    ) -> QueueResult<()> {
        redis::pipe()
            .cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .ignore()
            .cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .ignore()
            .query_async::<()>(conn)
            .await?;
        Ok(())
    }

    /// Write the settled record, schedule or dead-letter it, and ack the
    /// entry, all only if the claim still belongs to `claimed`.
    async fn commit(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        claimed: &ClaimedJob,
        record: &JobRecord,
        retry_at: Option<DateTime<Utc>>,
        dead_letter: Option<(String, &str)>,
    ) -> QueueResult<()> {
        let job_id = claimed.job_id().as_str();
        let (payload, reason) = dead_letter.unwrap_or_default();

        let script = Script::new(COMMIT_SCRIPT);
        let mut invocation = script.prepare_invoke();
        invocation
            .key(self.status_key(job_id))
            .key(&self.config.stream_name)
            .key(&self.config.delayed_set_name)
            .key(&self.config.dlq_stream_name)
            .arg(claimed.attempt)
            .arg(&self.config.consumer_group)
            .arg(&claimed.message_id)
            .arg(job_id)
            .arg(retry_at.map(|t| t.timestamp_millis().to_string()).unwrap_or_default())
            .arg(payload)
            .arg(reason)
            .arg(JOB_STATUS_TTL_SECS);

        let absent = absent_fields(record);
        invocation.arg(absent.len());
        for field in absent {
            invocation.arg(field);
        }
        for (field, value) in record_fields(record) {
            invocation.arg(field).arg(value);
        }

        let committed: i64 = invocation.invoke_async(conn).await?;
        if committed == 0 {
            warn!(job_id, attempt = claimed.attempt, "Claim was taken over, result dropped");
            return Err(QueueError::StaleClaim(format!(
                "job {} is no longer held at attempt {}",
                job_id, claimed.attempt
            )));
        }
        Ok(())
    }

    async fn load_record(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        job_id: &str,
    ) -> QueueResult<JobRecord> {
        let fields: HashMap<String, String> = conn.hgetall(self.status_key(job_id)).await?;
        if fields.is_empty() {
            return Err(QueueError::JobNotFound(job_id.to_string()));
        }
        record_from_fields(&fields)
    }

    /// Acknowledge a job as completed.
    ///
    /// Fails with `StaleClaim` when another consumer took the job over.
    pub async fn complete(&self, claimed: &ClaimedJob) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let job_id = claimed.job_id().as_str();

        let mut record = self.load_record(&mut conn, job_id).await?;
        check_claim(&record, claimed)?;
        record
            .complete()
            .map_err(|e| QueueError::StaleClaim(format!("job {}: {}", job_id, e)))?;

        self.commit(&mut conn, claimed, &record, None, None).await?;

        debug!(job_id, "Acknowledged job");
        Ok(())
    }

    /// Record a failed attempt.
    ///
    /// Retryable failures below the attempt ceiling go to the delayed set;
    /// everything else goes to the dead-letter stream and raises an alert.
    pub async fn fail(
        &self,
        claimed: &ClaimedJob,
        error: &str,
        retryable: bool,
    ) -> QueueResult<FailureOutcome> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let job_id = claimed.job_id().as_str();

        let mut record = self.load_record(&mut conn, job_id).await?;
        check_claim(&record, claimed)?;
        let backoff = self.config.retry.backoff(record.attempts);
        let backoff = chrono::Duration::from_std(backoff).unwrap_or(chrono::Duration::zero());
        let outcome = record
            .fail(error, retryable, backoff)
            .map_err(|e| QueueError::StaleClaim(format!("job {}: {}", job_id, e)))?;

        match &outcome {
            FailureOutcome::Retry { retry_at, .. } => {
                self.commit(&mut conn, claimed, &record, Some(*retry_at), None)
                    .await?;
            }
            FailureOutcome::Permanent { reason, .. } => {
                let payload = serde_json::to_string(&claimed.job)?;
                self.commit(&mut conn, claimed, &record, None, Some((payload, reason.as_str())))
                    .await?;
            }
        }

        match &outcome {
            FailureOutcome::Retry { attempt, retry_at } => {
                warn!(
                    job_id,
                    attempt,
                    retry_at = %retry_at,
                    error,
                    "Job failed, retry scheduled"
                );
            }
            FailureOutcome::Permanent { attempts, reason } => {
                error!(job_id, attempts, reason = %reason, "Moved job to DLQ");
                let alert = OperatorAlert {
                    job_id: claimed.job_id().clone(),
                    job_type: claimed.job.job_type(),
                    attempts: *attempts,
                    reason: reason.clone(),
                    failed_at: Utc::now(),
                };
                if let Err(e) = self.alerts.publish(&alert).await {
                    error!(job_id, "Failed to publish operator alert: {}", e);
                }
            }
        }

        Ok(outcome)
    }

    /// Move due retries back onto the stream; returns how many moved.
    pub async fn promote_due(&self, now: DateTime<Utc>, count: usize) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let moved: u64 = Script::new(PROMOTE_SCRIPT)
            .key(&self.config.delayed_set_name)
            .key(&self.config.stream_name)
            .arg(now.timestamp_millis())
            .arg(count)
            .arg(&self.config.status_key_prefix)
            .invoke_async(&mut conn)
            .await?;

        if moved > 0 {
            debug!(moved, "Promoted delayed jobs");
        }
        Ok(moved)
    }

    /// Cancel a job that no worker holds yet.
    ///
    /// Returns `false` when the job is already active or finished.
    pub async fn cancel(&self, job_id: &JobId) -> QueueResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: i64 = Script::new(CANCEL_SCRIPT)
            .key(self.status_key(job_id.as_str()))
            .key(&self.config.delayed_set_name)
            .arg(Utc::now().to_rfc3339())
            .arg(job_id.as_str())
            .invoke_async(&mut conn)
            .await?;

        match result {
            1 => {
                info!(job_id = %job_id, "Cancelled job");
                Ok(true)
            }
            0 => Ok(false),
            _ => Err(QueueError::JobNotFound(job_id.to_string())),
        }
    }

    /// Current status record of a job.
    pub async fn status(&self, job_id: &JobId) -> QueueResult<JobRecord> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        self.load_record(&mut conn, job_id.as_str()).await
    }

    /// Get queue length.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }

    /// Get DLQ length.
    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.dlq_stream_name).await?;
        Ok(len)
    }

    /// Number of jobs waiting for a retry.
    pub async fn delayed_len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.zcard(&self.config.delayed_set_name).await?;
        Ok(len)
    }

    pub async fn stats(&self) -> QueueResult<QueueStats> {
        Ok(QueueStats {
            stream: self.len().await?,
            delayed: self.delayed_len().await?,
            dead_letter: self.dlq_len().await?,
        })
    }
}

/// The caller still owns the job: it is active at the caller's attempt.
fn check_claim(record: &JobRecord, claimed: &ClaimedJob) -> QueueResult<()> {
    if record.status != JobState::Active || record.attempts != claimed.attempt {
        return Err(QueueError::StaleClaim(format!(
            "job {} is {} at attempt {}, claim was for attempt {}",
            record.id, record.status, record.attempts, claimed.attempt
        )));
    }
    Ok(())
}

/// Optional hash fields the record no longer carries.
fn absent_fields(record: &JobRecord) -> Vec<&'static str> {
    let mut absent = Vec::new();
    if record.scheduled_at.is_none() {
        absent.push("scheduled_at");
    }
    if record.last_error.is_none() {
        absent.push("last_error");
    }
    absent
}

/// Hash fields of a status record (without the payload).
fn record_fields(record: &JobRecord) -> Vec<(&'static str, String)> {
    let mut fields = vec![
        ("id", record.id.to_string()),
        ("job_type", record.job_type.as_str().to_string()),
        ("status", record.status.as_str().to_string()),
        ("attempts", record.attempts.to_string()),
        ("max_attempts", record.max_attempts.to_string()),
        ("permanent", if record.permanent { "1" } else { "0" }.to_string()),
        ("created_at", record.created_at.to_rfc3339()),
        ("updated_at", record.updated_at.to_rfc3339()),
    ];
    if let Some(at) = record.scheduled_at {
        fields.push(("scheduled_at", at.to_rfc3339()));
    }
    if let Some(error) = &record.last_error {
        fields.push(("last_error", error.clone()));
    }
    fields
}

fn record_from_fields(fields: &HashMap<String, String>) -> QueueResult<JobRecord> {
    let get = |name: &str| {
        fields
            .get(name)
            .ok_or_else(|| QueueError::corrupt(format!("missing field {}", name)))
    };
    let timestamp = |name: &str| -> QueueResult<DateTime<Utc>> {
        let raw = get(name)?;
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| QueueError::corrupt(format!("{}: {}", name, e)))
    };
    let number = |name: &str| -> QueueResult<u32> {
        get(name)?
            .parse()
            .map_err(|e| QueueError::corrupt(format!("{}: {}", name, e)))
    };

    let job_type = JobType::parse(get("job_type")?)
        .ok_or_else(|| QueueError::corrupt("unknown job type"))?;
    let status = JobState::parse(get("status")?)
        .ok_or_else(|| QueueError::corrupt("unknown status"))?;
    let scheduled_at = match fields.get("scheduled_at") {
        Some(_) => Some(timestamp("scheduled_at")?),
        None => None,
    };

    Ok(JobRecord {
        id: JobId::from_string(get("id")?.clone()),
        job_type,
        status,
        attempts: number("attempts")?,
        max_attempts: number("max_attempts")?,
        scheduled_at,
        last_error: fields.get("last_error").cloned(),
        permanent: fields.get("permanent").map(|v| v == "1").unwrap_or(false),
        created_at: timestamp("created_at")?,
        updated_at: timestamp("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_map(fields: Vec<(&'static str, String)>) -> HashMap<String, String> {
        fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn test_record_hash_fields_roundtrip() {
        let mut record = JobRecord::new(JobId::new(), JobType::PostModeration, 3);
        record.activate().unwrap();
        record
            .fail("store timeout", true, chrono::Duration::seconds(5))
            .unwrap();

        let decoded = record_from_fields(&to_map(record_fields(&record))).unwrap();

        assert_eq!(decoded.id, record.id);
        assert_eq!(decoded.status, JobState::Pending);
        assert_eq!(decoded.attempts, 1);
        assert_eq!(decoded.last_error.as_deref(), Some("store timeout"));
        assert!(decoded.scheduled_at.is_some());
        assert!(!decoded.permanent);
    }

    #[test]
    fn test_corrupt_record_is_reported() {
        let mut fields = to_map(record_fields(&JobRecord::new(
            JobId::new(),
            JobType::JobAnalysis,
            3,
        )));
        fields.insert("status".to_string(), "exploded".to_string());
        assert!(matches!(
            record_from_fields(&fields),
            Err(QueueError::CorruptRecord(_))
        ));

        fields.remove("attempts");
        assert!(record_from_fields(&fields).is_err());
    }

    fn claimed_at(attempt: u32) -> ClaimedJob {
        ClaimedJob {
            message_id: "1-0".to_string(),
            job: QueueJob::PostModeration(crate::job::PostModerationJob::new(3)),
            attempt,
        }
    }

    #[test]
    fn test_only_the_current_claim_may_settle_a_job() {
        let mut record = JobRecord::new(JobId::new(), JobType::PostModeration, 3);
        record.activate().unwrap();

        // First worker stalls, the job is taken over as attempt 2.
        record.status = JobState::Pending;
        record.activate().unwrap();

        let stalled = claimed_at(1);
        assert!(matches!(
            check_claim(&record, &stalled),
            Err(QueueError::StaleClaim(_))
        ));
        assert!(check_claim(&record, &claimed_at(2)).is_ok());

        record.complete().unwrap();
        assert!(matches!(
            check_claim(&record, &claimed_at(2)),
            Err(QueueError::StaleClaim(_))
        ));
    }

    #[test]
    fn test_absent_fields_follow_the_record() {
        let mut record = JobRecord::new(JobId::new(), JobType::ActivityScoring, 3);
        assert_eq!(absent_fields(&record), vec!["scheduled_at", "last_error"]);

        record.activate().unwrap();
        record
            .fail("timeout", true, chrono::Duration::seconds(1))
            .unwrap();
        assert!(absent_fields(&record).is_empty());
    }

    #[test]
    fn test_default_keys() {
        let config = QueueConfig::default();
        assert_eq!(config.stream_name, "emploi:jobs");
        assert_eq!(config.retry.max_attempts, 3);
    }
}
