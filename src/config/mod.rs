//! Declarative configuration: one TOML document describing both accounts
//! plus engine-wide trading parameters. Re-read from disk on every
//! [`credentials::CredentialsStore::get_fresh`] call -- no process-lifetime
//! cache, so an operator editing the file takes effect on the next cycle.

pub mod credentials;

pub use credentials::{AccountDocument, CredentialsDocument, CredentialsStore};

use serde::Deserialize;
use std::time::Duration;

/// Knobs for the trading cycle engine, candidate provider, and schedule
/// controller. Defaults mirror spec.md's stated defaults; every field is
/// overridable from the `[engine]` table of the credentials document.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub position_size_ratio: f64,
    pub max_positions: usize,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub buy_confidence_threshold: f64,
    pub max_candidates: usize,
    pub candidate_price_floor: f64,
    pub candidate_price_ceiling: f64,
    pub candidate_change_rate_floor: f64,
    pub candidate_volume_ratio_floor: f64,
    pub simulate_orders: bool,
    pub close_time_hhmm: String,
    pub close_guard_minutes: i64,
    pub entry_cutoff_hhmm: String,
    pub skip_market_hours: bool,
    pub snapshot_refresh_interval_secs: u64,
    pub stop_signal_path: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            position_size_ratio: 0.20,
            max_positions: 5,
            stop_loss_pct: -0.03,
            take_profit_pct: 0.05,
            buy_confidence_threshold: 0.6,
            max_candidates: 10,
            candidate_price_floor: 1_000.0,
            candidate_price_ceiling: 200_000.0,
            candidate_change_rate_floor: 2.0,
            candidate_volume_ratio_floor: 150.0,
            simulate_orders: false,
            close_time_hhmm: "15:30".to_string(),
            close_guard_minutes: 10,
            entry_cutoff_hhmm: "15:00".to_string(),
            skip_market_hours: false,
            snapshot_refresh_interval_secs: 300,
            stop_signal_path: "STOP_AUTOTRADING.signal".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn snapshot_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_refresh_interval_secs)
    }
}
