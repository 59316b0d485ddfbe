//! Token-bucket admission gate for remote operations.
//!
//! One bucket of `capacity` tokens. Every `window` the bucket is reset to
//! exactly `capacity`; there is no gradual leak. Denial never blocks: the
//! caller skips the operation and the next scheduled tick tries again.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Default bucket capacity (operations per window).
pub const DEFAULT_CAPACITY: u32 = 80;

/// Default refill window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(100);

#[derive(Debug)]
pub struct RateLimiter {
    capacity: u32,
    window: Duration,
    available: AtomicU32,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_WINDOW)
    }
}

impl RateLimiter {
    /// Full bucket of `capacity` tokens, refilled every `window`.
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            capacity,
            window,
            available: AtomicU32::new(capacity),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn available(&self) -> u32 {
        self.available.load(Ordering::Acquire)
    }

    /// Deduct `n` tokens if at least `n` are available.
    ///
    /// Returns `false` without touching the bucket otherwise.
    pub fn try_consume(&self, n: u32) -> bool {
        self.available
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_sub(n)
            })
            .is_ok()
    }

    /// Reset the bucket to exactly `capacity`.
    pub fn refill(&self) {
        self.available.store(self.capacity, Ordering::Release);
    }

    /// Spawn the periodic refill task. It runs until `shutdown` fires.
    pub fn spawn_refill(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.window);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            interval.tick().await; // first tick is immediate; the bucket starts full

            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = interval.tick() => {
                        self.refill();
                        tracing::debug!(capacity = self.capacity, "rate limiter refilled");
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumes_until_empty_then_denies() {
        let limiter = RateLimiter::new(3, DEFAULT_WINDOW);
        assert!(limiter.try_consume(1));
        assert!(limiter.try_consume(2));
        assert!(!limiter.try_consume(1));
        assert_eq!(limiter.available(), 0);
    }

    #[test]
    fn denial_has_no_side_effect() {
        let limiter = RateLimiter::new(2, DEFAULT_WINDOW);
        assert!(!limiter.try_consume(3));
        assert_eq!(limiter.available(), 2);
    }

    #[test]
    fn refill_resets_to_capacity_not_beyond() {
        let limiter = RateLimiter::new(80, DEFAULT_WINDOW);
        for _ in 0..80 {
            assert!(limiter.try_consume(1));
        }
        assert!(!limiter.try_consume(1));

        limiter.refill();
        assert_eq!(limiter.available(), 80);
        limiter.refill();
        assert_eq!(limiter.available(), 80, "refill must not accumulate");
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn refill_task_resets_after_window() {
        let limiter = Arc::new(RateLimiter::new(2, Duration::from_secs(100)));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = limiter.clone().spawn_refill(shutdown_rx);
        tokio::task::yield_now().await;

        assert!(limiter.try_consume(2));
        assert!(!limiter.try_consume(1));

        tokio::time::sleep(Duration::from_secs(50)).await;
        assert!(!limiter.try_consume(1), "no refill before the window elapses");

        tokio::time::sleep(Duration::from_secs(51)).await;
        assert_eq!(limiter.available(), 2);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
