//! Batcher and provider configuration.

use std::time::Duration;

/// Default upper bound on recipients per batch.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 1000;

/// Batching configuration.
#[derive(Debug, Clone)]
pub struct BatcherConfig {
    /// Recipients per batch before it is emitted
    pub max_batch_size: usize,
    /// Oldest request age before a partial batch is emitted
    pub max_wait: Duration,
    /// Pending requests buffered before senders wait
    pub channel_capacity: usize,
    /// Batches kept for another emit attempt after the sink failed
    pub retry_capacity: usize,
    /// Delay before the first re-emit; doubles per failure
    pub retry_base_delay: Duration,
    /// Upper bound on the re-emit delay
    pub retry_max_delay: Duration,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_wait: Duration::from_secs(2),
            channel_capacity: 10_000,
            retry_capacity: 1_000,
            retry_base_delay: Duration::from_millis(200),
            retry_max_delay: Duration::from_secs(30),
        }
    }
}

impl BatcherConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_batch_size: std::env::var("NOTIFY_MAX_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_batch_size),
            max_wait: Duration::from_millis(
                std::env::var("NOTIFY_MAX_WAIT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2_000),
            ),
            channel_capacity: std::env::var("NOTIFY_CHANNEL_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.channel_capacity),
            retry_capacity: std::env::var("NOTIFY_RETRY_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.retry_capacity),
            retry_base_delay: defaults.retry_base_delay,
            retry_max_delay: Duration::from_secs(
                std::env::var("NOTIFY_RETRY_MAX_DELAY_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }
}

/// Push provider client configuration.
#[derive(Debug, Clone)]
pub struct PushProviderConfig {
    /// Provider base URL (HTTPS in production)
    pub base_url: String,
    /// Bearer token sent with every call
    pub api_key: String,
    /// Request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Sustained batch sends per second
    pub batches_per_second: u32,
    /// Sends allowed in a burst
    pub burst: u32,
}

impl Default for PushProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://push.emploi-plus.local".to_string(),
            api_key: String::new(),
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(3),
            batches_per_second: 10,
            burst: 10,
        }
    }
}

impl PushProviderConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("PUSH_PROVIDER_URL").unwrap_or(defaults.base_url),
            api_key: std::env::var("PUSH_PROVIDER_API_KEY").unwrap_or_default(),
            timeout: Duration::from_secs(
                std::env::var("PUSH_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
            connect_timeout: Duration::from_secs(
                std::env::var("PUSH_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3),
            ),
            batches_per_second: std::env::var("PUSH_RATE_PER_SEC")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.batches_per_second),
            burst: std::env::var("PUSH_RATE_BURST")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.burst),
        }
    }
}
