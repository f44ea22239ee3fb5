//! The two trading algorithms this engine ships, plus the factory that
//! picks between them at session bootstrap.

pub mod intraday;
pub mod strategy_factory;
pub mod swing;

pub use intraday::{IntradayStrategy, IntradayStrategyConfig};
pub use strategy_factory::StrategyFactory;
pub use swing::{SwingStrategy, SwingStrategyConfig};
