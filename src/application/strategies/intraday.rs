//! Intraday/day strategy: minute-candle RSI mean-reversion. The decision
//! contract is stateless per call, so the RSI series
//! (`RelativeStrengthIndex::new(period)`, fed via `ta::Next`) is
//! recomputed from the candle history on every `analyze` call, with
//! oversold/overbought bands driving the buy/sell decision.

use crate::domain::strategy::{Signal, StockData, Strategy, StrategyDecision};
use rust_decimal::prelude::ToPrimitive;
use std::time::Duration;
use ta::indicators::RelativeStrengthIndex;
use ta::Next;

#[derive(Debug, Clone)]
pub struct IntradayStrategyConfig {
    pub rsi_period: usize,
    pub oversold: f64,
    pub overbought: f64,
    pub cycle_interval: Duration,
}

impl Default for IntradayStrategyConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            oversold: 30.0,
            overbought: 70.0,
            cycle_interval: Duration::from_secs(30),
        }
    }
}

/// RSI below the oversold band → BUY (mean-reversion entry); RSI above the
/// overbought band → SELL; otherwise HOLD.
pub struct IntradayStrategy {
    config: IntradayStrategyConfig,
}

impl IntradayStrategy {
    pub fn new(config: IntradayStrategyConfig) -> Self {
        Self { config }
    }

    fn rsi(&self, data: &StockData) -> Option<f64> {
        if data.minute_candles.len() < self.config.rsi_period + 1 {
            return None;
        }
        let mut rsi = RelativeStrengthIndex::new(self.config.rsi_period).ok()?;
        let mut value = 50.0;
        for candle in &data.minute_candles {
            let close = candle.close.to_f64().unwrap_or(0.0);
            value = rsi.next(close);
        }
        Some(value)
    }
}

impl Strategy for IntradayStrategy {
    fn name(&self) -> &str {
        "intraday-rsi-reversion"
    }

    fn analyze(&self, data: &StockData, symbol: &str) -> StrategyDecision {
        let Some(rsi) = self.rsi(data) else {
            return StrategyDecision::hold("insufficient minute candle history for RSI");
        };

        if rsi < self.config.oversold {
            let depth = (self.config.oversold - rsi) / self.config.oversold;
            StrategyDecision {
                signal: Signal::Buy,
                confidence: depth.min(1.0).max(0.55),
                reason: format!("{symbol}: RSI {rsi:.1} below oversold band"),
                indicators: None,
            }
        } else if rsi > self.config.overbought {
            let depth = (rsi - self.config.overbought) / (100.0 - self.config.overbought);
            StrategyDecision {
                signal: Signal::Sell,
                confidence: depth.min(1.0).max(0.55),
                reason: format!("{symbol}: RSI {rsi:.1} above overbought band"),
                indicators: None,
            }
        } else {
            StrategyDecision::hold(format!("{symbol}: RSI {rsi:.1} within neutral band"))
        }
    }

    fn cycle_interval(&self) -> Duration {
        self.config.cycle_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn candles(closes: &[i64]) -> Vec<crate::domain::strategy::Candle> {
        closes
            .iter()
            .map(|c| crate::domain::strategy::Candle {
                timestamp: Utc::now(),
                open: rust_decimal::Decimal::from(*c),
                high: rust_decimal::Decimal::from(*c),
                low: rust_decimal::Decimal::from(*c),
                close: rust_decimal::Decimal::from(*c),
                volume: 1000,
            })
            .collect()
    }

    fn stock_data(closes: &[i64]) -> StockData {
        StockData {
            symbol: "035420".into(),
            last_price: dec!(0),
            daily_candles: vec![],
            minute_candles: candles(closes),
        }
    }

    #[test]
    fn insufficient_history_holds() {
        let strategy = IntradayStrategy::new(IntradayStrategyConfig::default());
        let decision = strategy.analyze(&stock_data(&[100, 101]), "035420");
        assert_eq!(decision.signal, Signal::Hold);
    }

    #[test]
    fn sustained_decline_triggers_buy() {
        let strategy = IntradayStrategy::new(IntradayStrategyConfig::default());
        let closes: Vec<i64> = (0..30).map(|i| 1000 - i * 5).collect();
        let decision = strategy.analyze(&stock_data(&closes), "035420");
        assert_eq!(decision.signal, Signal::Buy);
    }

    #[test]
    fn sustained_rally_triggers_sell() {
        let strategy = IntradayStrategy::new(IntradayStrategyConfig::default());
        let closes: Vec<i64> = (0..30).map(|i| 1000 + i * 5).collect();
        let decision = strategy.analyze(&stock_data(&closes), "035420");
        assert_eq!(decision.signal, Signal::Sell);
    }

    #[test]
    fn default_cycle_interval_is_thirty_seconds() {
        let strategy = IntradayStrategy::new(IntradayStrategyConfig::default());
        assert_eq!(strategy.cycle_interval(), Duration::from_secs(30));
    }
}
