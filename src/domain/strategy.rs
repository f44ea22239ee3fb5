use crate::domain::account::Account;
use crate::domain::cycle_report::SessionStats;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// A single price/volume bar, used for both daily and minute candles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
}

/// Everything a strategy is handed for one symbol in one cycle: current
/// quote plus recent history. The engine builds this once per candidate
/// per cycle and never mutates it afterwards.
#[derive(Debug, Clone)]
pub struct StockData {
    pub symbol: String,
    pub last_price: Decimal,
    pub daily_candles: Vec<Candle>,
    pub minute_candles: Vec<Candle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

/// The single normalized shape every strategy decision is funneled into.
/// Never let a raw strategy return value leak past [`StrategyDecision::coerce`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyDecision {
    pub signal: Signal,
    pub confidence: f64,
    pub reason: String,
    pub indicators: Option<serde_json::Map<String, Value>>,
}

impl StrategyDecision {
    pub fn hold(reason: impl Into<String>) -> Self {
        Self {
            signal: Signal::Hold,
            confidence: 0.5,
            reason: reason.into(),
            indicators: None,
        }
    }

    /// Coerces any strategy return shape -- a well-formed decision object,
    /// a bare signal string, `null`, an array, or anything else -- into a
    /// `StrategyDecision`. Anything that isn't an object with a recognized
    /// `signal` field becomes HOLD at confidence 0.5, per spec: the engine
    /// must never see a raw, un-normalized value.
    pub fn coerce(raw: Value) -> Self {
        match raw {
            Value::Object(map) => {
                let signal = map
                    .get("signal")
                    .and_then(Value::as_str)
                    .map(parse_signal)
                    .unwrap_or(Signal::Hold);
                let confidence = map
                    .get("confidence")
                    .and_then(Value::as_f64)
                    .filter(|c| (0.0..=1.0).contains(c))
                    .unwrap_or(0.5);
                let reason = map
                    .get("reason")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| "no reason provided".to_string());
                let indicators = map.get("indicators").and_then(Value::as_object).cloned();
                Self {
                    signal,
                    confidence,
                    reason,
                    indicators,
                }
            }
            Value::String(s) => Self {
                signal: parse_signal(&s),
                confidence: 0.5,
                reason: "coerced from bare signal string".to_string(),
                indicators: None,
            },
            _ => Self::hold("non-dict or absent strategy result"),
        }
    }
}

fn parse_signal(s: &str) -> Signal {
    match s.to_ascii_uppercase().as_str() {
        "BUY" => Signal::Buy,
        "SELL" => Signal::Sell,
        _ => Signal::Hold,
    }
}

/// The two trading algorithms this engine ships. Selected once at session
/// bootstrap (operator CLI or config), never switched mid-session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyMode {
    /// Swing/auto: daily-candle SMA crossover, longer cycle interval.
    Swing,
    /// Intraday/day: minute-candle RSI mean-reversion, shorter cycle interval.
    Intraday,
}

impl StrategyMode {
    /// The sentinel stop-signal filename this mode's session watches:
    /// `STOP_AUTOTRADING.signal` for swing, `STOP_DAYTRADING.signal`
    /// for intraday.
    pub fn default_stop_signal_file(&self) -> &'static str {
        match self {
            StrategyMode::Swing => "STOP_AUTOTRADING.signal",
            StrategyMode::Intraday => "STOP_DAYTRADING.signal",
        }
    }
}

/// Uniform decision interface over pluggable trading algorithms. Only the
/// two concrete strategies this engine ships (swing/auto, intraday/day)
/// implement it; the engine itself only ever calls through the trait.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    fn analyze(&self, data: &StockData, symbol: &str) -> StrategyDecision;

    /// Defensive default: 120 seconds between cycles.
    fn cycle_interval(&self) -> Duration {
        Duration::from_secs(120)
    }

    /// Defensive default: never veto trading.
    fn should_stop_trading(&self) -> bool {
        false
    }

    fn on_algorithm_start(&self, account: &Account, balance: Decimal, stats: &SessionStats) -> String {
        format!(
            "{} strategy starting on {} with balance {} ({} cycles completed so far)",
            self.name(),
            account.account_type,
            balance,
            stats.cycles_completed
        )
    }

    fn on_algorithm_end(&self, account: &Account, balance: Decimal, stats: &SessionStats) -> String {
        format!(
            "{} strategy ending on {} after {} cycles, balance {} ({} buys, {} sells, {} rejected)",
            self.name(),
            account.account_type,
            stats.cycles_completed,
            balance,
            stats.buys_submitted,
            stats.sells_submitted,
            stats.orders_rejected
        )
    }
}
