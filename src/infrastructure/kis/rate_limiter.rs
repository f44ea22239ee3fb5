use crate::domain::account::AccountType;
use crate::infrastructure::clock::Clock;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use prometheus::{IntCounterVec, Opts, Registry};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Sliding-window admission gate shared by one API client. `Acquire`
/// blocks until admission is possible, pruning timestamps older than
/// `now - window` and, if the window is full, sleeping until the oldest
/// recorded timestamp ages out. Does not itself retry failed calls --
/// that is the API client's job.
pub struct RateLimiter {
    capacity: usize,
    window: ChronoDuration,
    clock: Arc<dyn Clock>,
    timestamps: Mutex<VecDeque<DateTime<Utc>>>,
    calls_total: IntCounterVec,
    errors_total: IntCounterVec,
    rate_limit_hits_total: IntCounterVec,
    label: String,
    _registry: Registry,
}

impl RateLimiter {
    pub fn new(capacity: usize, window: Duration, clock: Arc<dyn Clock>, label: &str) -> Self {
        let registry = Registry::new();
        let calls_total = IntCounterVec::new(
            Opts::new("kis_rate_limiter_calls_total", "Total admitted calls"),
            &["account_type"],
        )
        .expect("valid metric");
        let errors_total = IntCounterVec::new(
            Opts::new("kis_rate_limiter_errors_total", "Total error responses observed"),
            &["account_type"],
        )
        .expect("valid metric");
        let rate_limit_hits_total = IntCounterVec::new(
            Opts::new(
                "kis_rate_limiter_rate_limit_hits_total",
                "Total rate-limit responses observed",
            ),
            &["account_type"],
        )
        .expect("valid metric");
        registry
            .register(Box::new(calls_total.clone()))
            .expect("register calls_total");
        registry
            .register(Box::new(errors_total.clone()))
            .expect("register errors_total");
        registry
            .register(Box::new(rate_limit_hits_total.clone()))
            .expect("register rate_limit_hits_total");

        Self {
            capacity,
            window: ChronoDuration::from_std(window).expect("window fits in chrono::Duration"),
            clock,
            timestamps: Mutex::new(VecDeque::with_capacity(capacity)),
            calls_total,
            errors_total,
            rate_limit_hits_total,
            label: label.to_string(),
            _registry: registry,
        }
    }

    /// PAPER defaults to (1, 2s); LIVE defaults to (2, 1s), per spec.
    pub fn for_account_type(account_type: AccountType, clock: Arc<dyn Clock>) -> Self {
        let (capacity, window) = match account_type {
            AccountType::Paper => (1, Duration::from_secs(2)),
            AccountType::Live => (2, Duration::from_secs(1)),
        };
        Self::new(capacity, window, clock, account_type.as_str())
    }

    /// Blocks until a new call may be admitted, then records the
    /// admission timestamp.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut timestamps = self.timestamps.lock().await;
                let now = self.clock.now();
                while let Some(&front) = timestamps.front() {
                    if now - front >= self.window {
                        timestamps.pop_front();
                    } else {
                        break;
                    }
                }
                if timestamps.len() < self.capacity {
                    timestamps.push_back(now);
                    self.calls_total.with_label_values(&[&self.label]).inc();
                    None
                } else {
                    let oldest = *timestamps.front().expect("window is full");
                    let remaining = self.window - (now - oldest);
                    Some(remaining.to_std().unwrap_or(Duration::from_millis(1)))
                }
            };

            match wait {
                None => return,
                Some(duration) => {
                    debug!(
                        account_type = %self.label,
                        wait_ms = duration.as_millis() as u64,
                        "rate limiter window full, waiting"
                    );
                    self.clock.sleep(duration).await;
                }
            }
        }
    }

    /// Records the HTTP status of a completed call for observability
    /// counters. Never itself triggers a retry.
    pub fn record_call(&self, status: u16) {
        if status == 429 {
            self.rate_limit_hits_total
                .with_label_values(&[&self.label])
                .inc();
        } else if status >= 400 {
            self.errors_total.with_label_values(&[&self.label]).inc();
        }
    }
}
