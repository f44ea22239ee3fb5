use crate::application::strategies::{IntradayStrategy, IntradayStrategyConfig, SwingStrategy, SwingStrategyConfig};
use crate::domain::strategy::{Strategy, StrategyMode};
use std::sync::Arc;

pub struct StrategyFactory;

impl StrategyFactory {
    pub fn create(mode: StrategyMode) -> Arc<dyn Strategy> {
        match mode {
            StrategyMode::Swing => Arc::new(SwingStrategy::new(SwingStrategyConfig::default())),
            StrategyMode::Intraday => Arc::new(IntradayStrategy::new(IntradayStrategyConfig::default())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swing_mode_produces_swing_strategy() {
        let strategy = StrategyFactory::create(StrategyMode::Swing);
        assert_eq!(strategy.name(), "swing-sma-crossover");
    }

    #[test]
    fn intraday_mode_produces_intraday_strategy() {
        let strategy = StrategyFactory::create(StrategyMode::Intraday);
        assert_eq!(strategy.name(), "intraday-rsi-reversion");
    }
}
