use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Injectable notion of time and sleeping, so the rate limiter, token
/// service, and schedule controller can be driven by a manually-advanced
/// clock in tests instead of real wall time.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// A manually-advanced clock for tests: `sleep` advances the virtual clock
/// immediately rather than suspending the task, so retry/backoff tests run
/// in microseconds instead of real seconds.
pub struct ManualClock {
    millis_since_epoch: AtomicI64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis_since_epoch: AtomicI64::new(start.timestamp_millis()),
        }
    }

    pub fn advance(&self, duration: Duration) {
        self.millis_since_epoch
            .fetch_add(duration.as_millis() as i64, Ordering::SeqCst);
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis_since_epoch.load(Ordering::SeqCst))
            .unwrap_or_else(Utc::now)
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
