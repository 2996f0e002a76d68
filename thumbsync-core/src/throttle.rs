//! Pacing and retry for outbound calls to the record store.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::contract::StoreError;

/// Default spacing between remote calls: five requests per second.
pub const DEFAULT_MIN_CALL_INTERVAL: Duration = Duration::from_millis(200);

/// Fixed minimum spacing between consecutive calls.
///
/// Not adaptive: it knows nothing about 429 responses, which are handled by [`call_with_retry`].
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// Wait until at least `min_interval` has passed since the previous `throttle` returned.
    pub async fn throttle(&self) {
        let mut last_call = self.last_call.lock().await;
        if let Some(previous) = *last_call {
            let ready_at = previous + self.min_interval;
            if ready_at > Instant::now() {
                sleep_until(ready_at).await;
            }
        }
        *last_call = Some(Instant::now());
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_CALL_INTERVAL)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// One attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Backoff before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

/// Run `call` with every attempt paced by `limiter`. Retryable errors back off
/// exponentially until `policy.max_retries` is exhausted; the last error is returned.
///
/// `cancel` is checked before every attempt and interrupts pacing and backoff waits with
/// [`StoreError::Cancelled`]. A call already in flight is allowed to finish.
pub async fn call_with_retry<T, F, Fut>(
    limiter: &RateLimiter,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    operation: &str,
    mut call: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(operation, attempts = attempt, "Cancelled before remote call");
                return Err(StoreError::Cancelled);
            }
            _ = limiter.throttle() => {}
        }
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                let delay = policy.delay_for(attempt);
                warn!(
                    operation,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retryable store error, backing off"
                );
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!(operation, attempts = attempt + 1, "Cancelled during backoff");
                        return Err(StoreError::Cancelled);
                    }
                    _ = sleep(delay) => {}
                }
                attempt += 1;
            }
            Err(e) => {
                debug!(operation, attempts = attempt + 1, error = %e, "Store call failed");
                return Err(e);
            }
        }
    }
}
