//! Swing/auto strategy: daily-candle SMA crossover.
//!
//! The indicator series is recomputed from `data.daily_candles` on every
//! `analyze` call instead of carried as mutable strategy state, since a
//! strategy instance here is shared (`Arc<dyn Strategy>`) across concurrent
//! candidate evaluation.

use crate::domain::strategy::{Signal, StockData, Strategy, StrategyDecision};
use rust_decimal::prelude::ToPrimitive;
use std::time::Duration;
use ta::indicators::SimpleMovingAverage;
use ta::Next;

#[derive(Debug, Clone)]
pub struct SwingStrategyConfig {
    pub fast_period: usize,
    pub slow_period: usize,
    /// Minimum fractional separation between fast and slow SMA to count as
    /// a cross, avoiding noise around the crossover point.
    pub threshold: f64,
    pub cycle_interval: Duration,
}

impl Default for SwingStrategyConfig {
    fn default() -> Self {
        Self {
            fast_period: 5,
            slow_period: 20,
            threshold: 0.002,
            cycle_interval: Duration::from_secs(120),
        }
    }
}

/// Golden cross (fast SMA rises threshold above slow SMA) → BUY; death
/// cross (fast SMA falls threshold below slow SMA) → SELL; otherwise HOLD.
pub struct SwingStrategy {
    config: SwingStrategyConfig,
}

impl SwingStrategy {
    pub fn new(config: SwingStrategyConfig) -> Self {
        Self { config }
    }

    /// Feeds the daily candle closes through a fresh pair of SMAs and
    /// returns `(fast, slow)` once both windows have enough history.
    fn smas(&self, data: &StockData) -> Option<(f64, f64)> {
        if data.daily_candles.len() < self.config.slow_period {
            return None;
        }
        let mut fast = SimpleMovingAverage::new(self.config.fast_period).ok()?;
        let mut slow = SimpleMovingAverage::new(self.config.slow_period).ok()?;
        let (mut fast_val, mut slow_val) = (0.0, 0.0);
        for candle in &data.daily_candles {
            let close = candle.close.to_f64().unwrap_or(0.0);
            fast_val = fast.next(close);
            slow_val = slow.next(close);
        }
        Some((fast_val, slow_val))
    }
}

impl Strategy for SwingStrategy {
    fn name(&self) -> &str {
        "swing-sma-crossover"
    }

    fn analyze(&self, data: &StockData, symbol: &str) -> StrategyDecision {
        let Some((fast, slow)) = self.smas(data) else {
            return StrategyDecision::hold("insufficient daily candle history for SMA crossover");
        };

        if slow <= 0.0 {
            return StrategyDecision::hold("slow SMA is non-positive, skipping");
        }

        let spread = (fast - slow) / slow;
        if spread > self.config.threshold {
            StrategyDecision {
                signal: Signal::Buy,
                confidence: (spread / self.config.threshold).min(1.0).max(0.6),
                reason: format!("{symbol}: golden cross (fast={fast:.2} slow={slow:.2})"),
                indicators: None,
            }
        } else if spread < -self.config.threshold {
            StrategyDecision {
                signal: Signal::Sell,
                confidence: (-spread / self.config.threshold).min(1.0).max(0.6),
                reason: format!("{symbol}: death cross (fast={fast:.2} slow={slow:.2})"),
                indicators: None,
            }
        } else {
            StrategyDecision::hold(format!("{symbol}: no crossover (fast={fast:.2} slow={slow:.2})"))
        }
    }

    fn cycle_interval(&self) -> Duration {
        self.config.cycle_interval
    }
}
