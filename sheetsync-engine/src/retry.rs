//! Bounded exponential backoff around a remote operation.
//!
//! Only failures carrying a retriable status are retried; everything else
//! propagates on first occurrence. The executor does not know what the
//! operation does, so callers only wrap idempotent work (batched reads, and
//! full-range overwrites).

use std::future::Future;
use std::time::Duration;

use crate::error::SyncError;

/// Statuses treated as transient.
pub const RETRIABLE_STATUS_CODES: &[u16] = &[429, 500, 502, 503, 504];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    /// Delay slept after the `failed_attempts`-th failure (1-based):
    /// `min(max_delay, base_delay * 2^failed_attempts)`.
    pub fn delay_after(&self, failed_attempts: u32) -> Duration {
        let factor = 2u32.checked_pow(failed_attempts).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Errors that expose an HTTP-like status for retry classification.
pub trait RetryClassify {
    fn status(&self) -> Option<u16>;
}

impl RetryClassify for SyncError {
    fn status(&self) -> Option<u16> {
        SyncError::status(self)
    }
}

pub fn is_retriable(status: Option<u16>) -> bool {
    status.is_some_and(|s| RETRIABLE_STATUS_CODES.contains(&s))
}

/// Run `operation`, retrying retriable failures per `policy`.
pub async fn with_retry<T, E, F, Fut>(policy: RetryPolicy, mut operation: F) -> Result<T, E>
where
    E: RetryClassify + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                let status = err.status();
                if !is_retriable(status) || attempt >= policy.max_attempts {
                    return Err(err);
                }
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    status = ?status,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after error",
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
