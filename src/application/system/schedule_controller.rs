//! Market-hours and cooperative-stop gating for the trading loop.
//!
//! Built against `infrastructure::clock::Clock` rather than reading real
//! wall time directly, so it stays deterministic under test -- every time
//! check goes through `chrono-tz`'s `Asia::Seoul` zone, never `Local`,
//! matching the token service's midnight-rollover rule.

use chrono::{NaiveTime, Timelike};
use chrono_tz::Asia::Seoul;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::infrastructure::clock::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopState {
    None,
    Cooperative,
    Force,
}

#[derive(Debug, Clone)]
pub struct ScheduleControllerConfig {
    pub close_time: NaiveTime,
    pub close_guard_minutes: i64,
    pub entry_cutoff: NaiveTime,
    pub skip_market_hours: bool,
}

impl ScheduleControllerConfig {
    pub fn from_engine_config(config: &crate::config::EngineConfig) -> Self {
        Self {
            close_time: parse_hhmm(&config.close_time_hhmm).unwrap_or_else(|| NaiveTime::from_hms_opt(15, 30, 0).unwrap()),
            close_guard_minutes: config.close_guard_minutes,
            entry_cutoff: parse_hhmm(&config.entry_cutoff_hhmm).unwrap_or_else(|| NaiveTime::from_hms_opt(15, 0, 0).unwrap()),
            skip_market_hours: config.skip_market_hours,
        }
    }
}

fn parse_hhmm(raw: &str) -> Option<NaiveTime> {
    let (h, m) = raw.split_once(':')?;
    NaiveTime::from_hms_opt(h.parse().ok()?, m.parse().ok()?, 0)
}

/// Answers the three market-hours questions the trading cycle engine needs
/// each loop-top, and polls the stop-signal sentinel file / Ctrl-C flag at
/// ≤5-second granularity inside its cancellable sleep.
pub struct ScheduleController {
    config: ScheduleControllerConfig,
    clock: Arc<dyn Clock>,
    stop_signal_path: PathBuf,
    ctrl_c_requested: Arc<AtomicBool>,
}

impl ScheduleController {
    pub fn new(config: ScheduleControllerConfig, clock: Arc<dyn Clock>, stop_signal_path: impl Into<PathBuf>) -> Self {
        Self {
            config,
            clock,
            stop_signal_path: stop_signal_path.into(),
            ctrl_c_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawns a task that sets the shared Ctrl-C flag on `SIGINT`. Reuses a
    /// plain `AtomicBool` rather than pulling in a cancellation-token crate
    /// for one shared flag.
    pub fn watch_ctrl_c(&self) {
        let flag = self.ctrl_c_requested.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl-C received, requesting cooperative shutdown");
                flag.store(true, Ordering::SeqCst);
            }
        });
    }

    fn now_seoul(&self) -> chrono::DateTime<chrono_tz::Tz> {
        self.clock.now().with_timezone(&Seoul)
    }

    pub fn past_market_close(&self) -> bool {
        if self.config.skip_market_hours {
            return false;
        }
        self.now_seoul().time() >= self.config.close_time
    }

    pub fn in_close_guard(&self) -> bool {
        if self.config.skip_market_hours {
            return false;
        }
        let now = self.now_seoul().time();
        let guard_start = self.config.close_time - chrono::Duration::minutes(self.config.close_guard_minutes);
        now >= guard_start && now < self.config.close_time
    }

    pub fn entries_allowed(&self) -> bool {
        if self.config.skip_market_hours {
            return true;
        }
        self.now_seoul().time() < self.config.entry_cutoff
    }

    fn check_sentinel_file(&self) -> StopState {
        match std::fs::read_to_string(&self.stop_signal_path) {
            Ok(contents) => {
                if contents.trim() == "FORCE_EXIT" {
                    StopState::Force
                } else {
                    StopState::Cooperative
                }
            }
            Err(_) => StopState::None,
        }
    }

    /// Checked at loop-top: sentinel file or a prior Ctrl-C request.
    pub fn check_stop(&self) -> StopState {
        if self.ctrl_c_requested.load(Ordering::SeqCst) {
            return StopState::Cooperative;
        }
        self.check_sentinel_file()
    }

    /// Sleeps for `duration`, polling the stop condition every 5 seconds so
    /// a cooperative or forced stop is honored well before the sleep would
    /// otherwise elapse.
    pub async fn sleep_interrupted(&self, duration: Duration) -> StopState {
        let slice = Duration::from_secs(5);
        let mut remaining = duration;
        loop {
            let state = self.check_stop();
            if state != StopState::None {
                return state;
            }
            if remaining.is_zero() {
                return StopState::None;
            }
            let step = remaining.min(slice);
            self.clock.sleep(step).await;
            remaining = remaining.saturating_sub(step);
        }
    }

    pub fn stop_signal_path(&self) -> &Path {
        &self.stop_signal_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::ManualClock;
    use chrono::{TimeZone, Utc};

    fn clock_at_seoul_time(h: u32, m: u32) -> Arc<ManualClock> {
        let seoul_naive = Seoul.with_ymd_and_hms(2026, 7, 28, h, m, 0).unwrap();
        let utc = seoul_naive.with_timezone(&Utc);
        Arc::new(ManualClock::new(utc))
    }

    fn config() -> ScheduleControllerConfig {
        ScheduleControllerConfig {
            close_time: NaiveTime::from_hms_opt(15, 30, 0).unwrap(),
            close_guard_minutes: 10,
            entry_cutoff: NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
            skip_market_hours: false,
        }
    }

    #[test]
    fn before_close_is_not_past_market_close() {
        let clock = clock_at_seoul_time(14, 0);
        let controller = ScheduleController::new(config(), clock, "/tmp/does-not-exist.signal");
        assert!(!controller.past_market_close());
    }

    #[test]
    fn after_close_is_past_market_close() {
        let clock = clock_at_seoul_time(15, 31);
        let controller = ScheduleController::new(config(), clock, "/tmp/does-not-exist.signal");
        assert!(controller.past_market_close());
    }

    #[test]
    fn close_guard_window_is_ten_minutes_before_close() {
        let clock = clock_at_seoul_time(15, 25);
        let controller = ScheduleController::new(config(), clock, "/tmp/does-not-exist.signal");
        assert!(controller.in_close_guard());
    }

    #[test]
    fn entry_cutoff_blocks_new_positions_after_cutoff() {
        let clock = clock_at_seoul_time(15, 5);
        let controller = ScheduleController::new(config(), clock, "/tmp/does-not-exist.signal");
        assert!(!controller.entries_allowed());
    }

    #[test]
    fn skip_market_hours_bypasses_all_three_checks() {
        let mut cfg = config();
        cfg.skip_market_hours = true;
        let clock = clock_at_seoul_time(16, 0);
        let controller = ScheduleController::new(cfg, clock, "/tmp/does-not-exist.signal");
        assert!(!controller.past_market_close());
        assert!(!controller.in_close_guard());
        assert!(controller.entries_allowed());
    }

    #[test]
    fn missing_sentinel_file_is_no_stop() {
        let clock = clock_at_seoul_time(10, 0);
        let controller = ScheduleController::new(config(), clock, "/tmp/kis-trader-test-missing.signal");
        assert_eq!(controller.check_stop(), StopState::None);
    }

    #[tokio::test]
    async fn sentinel_file_with_force_exit_content_is_force_state() {
        let path = std::env::temp_dir().join(format!("kis-trader-sched-{}.signal", uuid::Uuid::new_v4()));
        std::fs::write(&path, "FORCE_EXIT").unwrap();
        let clock = clock_at_seoul_time(10, 0);
        let controller = ScheduleController::new(config(), clock, &path);
        assert_eq!(controller.check_stop(), StopState::Force);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn sentinel_file_with_other_content_is_cooperative() {
        let path = std::env::temp_dir().join(format!("kis-trader-sched-{}.signal", uuid::Uuid::new_v4()));
        std::fs::write(&path, "stop please").unwrap();
        let clock = clock_at_seoul_time(10, 0);
        let controller = ScheduleController::new(config(), clock, &path);
        assert_eq!(controller.check_stop(), StopState::Cooperative);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn sleep_interrupted_stops_early_when_sentinel_appears() {
        let path = std::env::temp_dir().join(format!("kis-trader-sched-{}.signal", uuid::Uuid::new_v4()));
        std::fs::write(&path, "FORCE_EXIT").unwrap();
        let clock = clock_at_seoul_time(10, 0);
        let controller = ScheduleController::new(config(), clock, &path);
        let state = controller.sleep_interrupted(Duration::from_secs(120)).await;
        assert_eq!(state, StopState::Force);
        let _ = std::fs::remove_file(&path);
    }
}
