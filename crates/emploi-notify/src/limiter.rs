//! Token bucket for outbound provider calls.

use std::num::NonZeroU32;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

/// Process-local token bucket shared by delivery tasks.
///
/// Starts full on every process start; nothing is coordinated across
/// worker processes.
pub struct DeliveryLimiter {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl DeliveryLimiter {
    pub fn new(per_second: u32, burst: u32) -> Self {
        let rate = NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst).unwrap_or(rate);
        Self {
            limiter: RateLimiter::direct(Quota::per_second(rate).allow_burst(burst)),
        }
    }

    /// Wait until a send is allowed.
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }
}
