//! Background job worker.
//!
//! This crate provides:
//! - `JobExecutor`: claims jobs from the Redis queue with bounded concurrency
//! - Processors for job posting analysis, post moderation, activity scoring
//!   and notification batch delivery
//! - `QueueBatchSink`: feeds batched notifications back onto the queue

pub mod analysis;
pub mod config;
pub mod delivery;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod moderation;
pub mod processor;
pub mod scoring;
pub mod sink;

pub use analysis::SkillExtractor;
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
pub use processor::{process_job, ProcessingContext};
pub use sink::QueueBatchSink;
