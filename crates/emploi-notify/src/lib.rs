//! Notification delivery.
//!
//! This crate provides:
//! - `Batcher`: groups requests sharing a message into bounded batches
//! - `DeliveryLimiter`: token bucket pacing outbound provider calls
//! - `PushProvider`: the external push service, with an HTTPS client

pub mod batcher;
pub mod config;
pub mod error;
pub mod limiter;
pub mod provider;

pub use batcher::{
    chunk_recipients, spawn_batcher, BatchSink, Batcher, NotificationSender, RetryBuffer,
};
pub use config::{BatcherConfig, PushProviderConfig};
pub use error::{NotifyError, NotifyResult};
pub use limiter::DeliveryLimiter;
pub use provider::{HttpPushProvider, PushProvider};
