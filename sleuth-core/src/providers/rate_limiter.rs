//! Client-side token bucket for language model requests.
//!
//! Every model call in the process draws one token from a shared bucket that
//! refills at a fixed rate. With the default settings (5 calls/s, burst 1)
//! consecutive calls are spaced at least 200 ms apart.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

/// Configuration for request pacing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitConfig {
    /// Sustained calls per second (0 or negative = unlimited).
    pub calls_per_second: f64,
    /// Bucket capacity. A value of 0 is treated as 1.
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            calls_per_second: 5.0,
            burst: 1,
        }
    }
}

impl RateLimitConfig {
    /// No pacing at all.
    pub fn unlimited() -> Self {
        Self {
            calls_per_second: 0.0,
            burst: 1,
        }
    }
}

/// A token bucket that tracks how many calls may start right now.
#[derive(Debug)]
pub struct TokenBucketLimiter {
    config: RateLimitConfig,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucketLimiter {
    /// Create a new limiter with a full bucket.
    pub fn new(config: RateLimitConfig) -> Self {
        let capacity = config.burst.max(1) as f64;
        Self {
            config,
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    /// Check if a call can start now.
    ///
    /// Returns `None` if a token is available, or `Some(delay)` indicating how
    /// long to wait before one will be.
    pub fn check(&mut self) -> Option<Duration> {
        if !self.has_limits() {
            return None;
        }
        self.refill(Instant::now());
        if self.tokens >= 1.0 {
            None
        } else {
            let missing = 1.0 - self.tokens;
            Some(Duration::from_secs_f64(
                missing / self.config.calls_per_second,
            ))
        }
    }

    /// Consume one token for a call that is starting.
    pub fn record(&mut self) {
        if self.has_limits() {
            self.tokens -= 1.0;
        }
    }

    /// Check if any limit is configured.
    pub fn has_limits(&self) -> bool {
        self.config.calls_per_second > 0.0
    }

    fn capacity(&self) -> f64 {
        self.config.burst.max(1) as f64
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.config.calls_per_second).min(self.capacity());
        self.last_refill = now;
    }
}

/// Async wrapper shared by every caller of the model gateway.
#[derive(Debug)]
pub struct PacingLimiter {
    bucket: Mutex<TokenBucketLimiter>,
}

impl PacingLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            bucket: Mutex::new(TokenBucketLimiter::new(config)),
        }
    }

    /// Wait until a call may start, then claim it. Returns the time spent waiting.
    pub async fn acquire(&self) -> Duration {
        let mut waited = Duration::ZERO;
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                match bucket.check() {
                    None => {
                        bucket.record();
                        return waited;
                    }
                    Some(wait) => wait,
                }
            };
            trace!(wait_ms = wait.as_millis() as u64, "Pacing model request");
            tokio::time::sleep(wait).await;
            waited += wait;
        }
    }
}
