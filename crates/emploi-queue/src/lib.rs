//! Redis Streams job queue.
//!
//! This crate provides:
//! - Typed job payloads validated at enqueue time
//! - Exclusive claims through a consumer group, with stale-claim recovery
//! - Retries with exponential backoff and jitter via a delayed sorted set
//! - Job status records and a dead-letter stream
//! - Operator alerts via Redis Pub/Sub

pub mod alerts;
pub mod dispatcher;
pub mod error;
pub mod job;
pub mod queue;
pub mod retry;

pub use alerts::{AlertChannel, OperatorAlert};
pub use dispatcher::JobDispatcher;
pub use error::{QueueError, QueueResult};
pub use job::{
    ActivityScoringJob, JobAnalysisJob, NotificationBatchJob, PostModerationJob, QueueJob,
    MAX_BATCH_RECIPIENTS,
};
pub use queue::{ClaimedJob, JobQueue, QueueConfig, QueueStats, JOB_STATUS_TTL_SECS};
pub use retry::RetryPolicy;
