use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One held position. Created on first BUY fill, mutated on subsequent
/// fills and price refreshes, removed once `quantity` returns to zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub display_name: String,
    pub quantity: u64,
    pub sellable_quantity: u64,
    pub average_price: Decimal,
    pub current_price: Decimal,
    pub evaluation_amount: Decimal,
    pub unrealized_pnl: Decimal,
    pub unrealized_pnl_rate: Decimal,
}

impl Position {
    /// Normalizes an `avg_price` field read from a loosely-typed upstream
    /// record: falls back to `average_price`, then `price`, else zero.
    /// Mirrors the cycle engine's `currentPositions` bookkeeping rule.
    pub fn normalize_avg_price(
        avg_price: Option<Decimal>,
        average_price: Option<Decimal>,
        price: Option<Decimal>,
    ) -> Decimal {
        avg_price
            .or(average_price)
            .or(price)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn cost_basis(&self) -> Decimal {
        self.average_price * Decimal::from(self.quantity)
    }

    pub fn profit_rate(&self) -> Decimal {
        let basis = self.cost_basis();
        if basis.is_zero() {
            Decimal::ZERO
        } else {
            self.unrealized_pnl / basis
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingOrder {
    pub order_id: String,
    pub symbol: String,
    pub side: super::order::OrderSide,
    pub quantity: u64,
    pub submitted_at: DateTime<Utc>,
}

/// A session-scoped, internally-consistent view of cash, holdings, and
/// pending orders. Owned exclusively by
/// [`crate::application::account_state_manager::AccountStateManager`];
/// every other component receives it by value (an `Arc` clone), never by
/// mutable reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub taken_at: DateTime<Utc>,
    pub cash_balance: Decimal,
    pub available_cash: Decimal,
    pub total_evaluation: Decimal,
    pub realized_pnl: Decimal,
    pub pnl_rate: Decimal,
    pub positions: HashMap<String, Position>,
    pub pending_orders: Vec<PendingOrder>,
    /// Set when the last refresh attempt failed and this snapshot is a
    /// carried-over copy of the previous successful refresh.
    pub stale: bool,
}

impl AccountSnapshot {
    pub fn is_fresh(&self, now: DateTime<Utc>, refresh_interval: chrono::Duration) -> bool {
        now - self.taken_at < refresh_interval
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    pub fn position_quantity(&self, symbol: &str) -> u64 {
        self.positions.get(symbol).map(|p| p.quantity).unwrap_or(0)
    }

    pub fn pending_order_count(&self) -> usize {
        self.pending_orders.len()
    }
}
