//! Periodic full-sync timer.
//!
//! The scheduler owns at most one timer task. Each tick awaits the supplied
//! callback before the next tick is considered, so ticks never overlap.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

struct Timer {
    interval: Duration,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
pub struct Scheduler {
    timer: Mutex<Option<Timer>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.timer().is_some()
    }

    /// Interval of the running timer, if any.
    pub fn interval(&self) -> Option<Duration> {
        self.timer().as_ref().map(|t| t.interval)
    }

    /// Start calling `tick` every `interval`, first after one full interval.
    ///
    /// Returns `false` without side effects when a timer is already running.
    pub fn start<F, Fut>(&self, interval: Duration, tick: F) -> bool
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.timer();
        if slot.is_some() {
            return false;
        }

        let (stop, mut stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticker.tick() => tick().await,
                }
            }
        });

        tracing::info!(interval_ms = interval.as_millis() as u64, "scheduler started");
        *slot = Some(Timer {
            interval,
            stop,
            handle,
        });
        true
    }

    /// Stop the timer. Returns `false` when nothing was running.
    ///
    /// A tick already in progress runs to completion.
    pub fn stop(&self) -> bool {
        match self.timer().take() {
            Some(timer) => {
                let _ = timer.stop.send(());
                tracing::info!("scheduler stopped");
                true
            }
            None => false,
        }
    }

    /// Replace a running timer with one using `interval`. No-op when stopped.
    pub fn restart<F, Fut>(&self, interval: Duration, tick: F) -> bool
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if !self.stop() {
            return false;
        }
        self.start(interval, tick)
    }

    /// Stop the timer and wait for an in-flight tick to finish.
    pub async fn shutdown(&self) {
        let timer = self.timer().take();
        if let Some(timer) = timer {
            let _ = timer.stop.send(());
            if let Err(err) = timer.handle.await {
                tracing::error!(error = %err, "scheduler task join failure");
            }
        }
    }

    fn timer(&self) -> MutexGuard<'_, Option<Timer>> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
