use crate::domain::trading::order::OrderSide;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Record of one buy or sell decision acted on during a cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: u64,
    pub price: Decimal,
    pub accepted: bool,
    pub broker_message: String,
    pub realized_pnl: Option<Decimal>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStats {
    pub cycles_completed: u64,
    pub buys_submitted: u64,
    pub sells_submitted: u64,
    pub orders_rejected: u64,
}

/// The per-cycle record emitted to telemetry. Sell outcomes always appear
/// before buy outcomes of the same cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_number: u64,
    pub taken_at: DateTime<Utc>,
    pub cash_balance: Decimal,
    pub position_count: usize,
    pub sell_outcomes: Vec<TradeOutcome>,
    pub buy_outcomes: Vec<TradeOutcome>,
    pub session_stats: SessionStats,
}

impl CycleReport {
    pub fn new(cycle_number: u64, cash_balance: Decimal, position_count: usize) -> Self {
        Self {
            cycle_number,
            taken_at: Utc::now(),
            cash_balance,
            position_count,
            sell_outcomes: Vec::new(),
            buy_outcomes: Vec::new(),
            session_stats: SessionStats::default(),
        }
    }
}
