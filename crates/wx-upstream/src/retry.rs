//! Bounded retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{UpstreamError, UpstreamResult};

/// Retry policy for upstream calls.
///
/// Only transport faults are retried; the upstream answering with an errcode
/// proves it reachable, and those faults belong to the layers above. The
/// exception is throttling, which may be opted into via
/// `retry_rate_limited`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry. Doubles on each subsequent retry.
    pub initial_delay: Duration,
    /// Hard cap on the computed delay.
    pub max_delay: Duration,
    /// Whether rate-limit faults are retried like transport faults.
    pub retry_rate_limited: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            retry_rate_limited: false,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-indexed): `initial * 2^attempt`,
    /// capped at `max_delay`.
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    fn should_retry(&self, err: &UpstreamError) -> bool {
        err.is_transport() || (self.retry_rate_limited && err.is_rate_limited())
    }
}

/// Runs `operation` with the retry policy applied.
///
/// Cancellation is honoured both between attempts and during the backoff
/// sleep; the caller is expected to make each attempt itself
/// cancellation-aware.
pub(crate) async fn retry_transport<F, Fut, T>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    operation: F,
) -> UpstreamResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = UpstreamResult<T>>,
{
    let mut attempt = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(UpstreamError::Cancelled);
        }

        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if policy.should_retry(&err) && attempt < policy.max_retries => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying upstream call after transient fault"
                );
                tokio::select! {
                    () = cancel.cancelled() => return Err(UpstreamError::Cancelled),
                    () = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
