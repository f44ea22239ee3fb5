//! Disposes of positions carried over from a prior session before a new one
//! starts trading. Flattens via market sell, narrowed from "everything,
//! unconditionally" to two named policies, computing realized pnl from
//! each position's last known price.

use crate::domain::cycle_report::TradeOutcome;
use crate::domain::errors::ApiError;
use crate::domain::ports::ExecutionPort;
use crate::domain::trading::order::{OrderRequest, OrderSide};
use crate::domain::trading::snapshot::AccountSnapshot;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Matches carried-over positions that should be left alone under
/// [`CarryOverPolicy::DayTrading`] -- an exact symbol match, the simplest
/// rule shape that covers the case without inventing a predicate DSL.
#[derive(Debug, Clone)]
pub struct RetentionRule {
    pub symbol: String,
}

impl RetentionRule {
    pub fn matches(&self, symbol: &str) -> bool {
        self.symbol == symbol
    }
}

#[derive(Debug, Clone)]
pub enum CarryOverPolicy {
    /// Retain every carried-over position; no orders are placed.
    Minimal,
    /// Liquidate every carried-over position at market unless a retention
    /// rule matches its symbol.
    DayTrading { retention_rules: Vec<RetentionRule> },
}

/// Runs once at session start, before the first trading cycle. Its output
/// is appended to the session's cycle-zero report, ahead of any regular
/// cycle's outcomes.
pub struct PreviousDayBalanceHandler {
    execution: Arc<dyn ExecutionPort>,
    policy: CarryOverPolicy,
}

impl PreviousDayBalanceHandler {
    pub fn new(execution: Arc<dyn ExecutionPort>, policy: CarryOverPolicy) -> Self {
        Self { execution, policy }
    }

    pub async fn run(&self, snapshot: &AccountSnapshot) -> Vec<TradeOutcome> {
        let retention_rules = match &self.policy {
            CarryOverPolicy::Minimal => {
                info!("previous-day policy is minimal, retaining all carried positions");
                return Vec::new();
            }
            CarryOverPolicy::DayTrading { retention_rules } => retention_rules,
        };

        let mut outcomes = Vec::new();
        for position in snapshot.positions.values() {
            if position.sellable_quantity == 0 {
                continue;
            }
            if retention_rules.iter().any(|r| r.matches(&position.symbol)) {
                info!(symbol = %position.symbol, "retention rule matched, leaving position open");
                continue;
            }

            let request = OrderRequest::market(position.symbol.clone(), OrderSide::Sell, position.sellable_quantity);
            let outcome = match self.execution.place_sell_order(&request).await {
                Ok(result) => {
                    let realized_pnl = if result.accepted {
                        Some((position.current_price - position.average_price) * Decimal::from(position.quantity))
                    } else {
                        None
                    };
                    TradeOutcome {
                        symbol: position.symbol.clone(),
                        side: OrderSide::Sell,
                        quantity: position.sellable_quantity,
                        price: position.current_price,
                        accepted: result.accepted,
                        broker_message: result.broker_message,
                        realized_pnl,
                        reason: "previous-day carry-over liquidation".to_string(),
                    }
                }
                Err(e) => {
                    error!(symbol = %position.symbol, error = %e, "previous-day liquidation order failed");
                    self.failed_outcome(position.symbol.clone(), position.sellable_quantity, position.current_price, e)
                }
            };
            outcomes.push(outcome);
        }

        if outcomes.is_empty() {
            warn!("previous-day handler found no carried positions to liquidate");
        }

        outcomes
    }

    fn failed_outcome(&self, symbol: String, quantity: u64, price: Decimal, error: ApiError) -> TradeOutcome {
        TradeOutcome {
            symbol,
            side: OrderSide::Sell,
            quantity,
            price,
            accepted: false,
            broker_message: error.to_string(),
            realized_pnl: None,
            reason: "previous-day carry-over liquidation".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::NetworkError;
    use crate::domain::trading::order::{OrderResult, OrderSide as Side};
    use crate::domain::trading::snapshot::Position;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeExecution {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl ExecutionPort for FakeExecution {
        async fn place_buy_order(&self, _req: &OrderRequest) -> Result<OrderResult, ApiError> {
            unimplemented!()
        }

        async fn place_sell_order(&self, req: &OrderRequest) -> Result<OrderResult, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ApiError::Network(NetworkError("down".into())));
            }
            Ok(OrderResult {
                accepted: true,
                order_id: Some("order-1".into()),
                broker_code: "0".into(),
                broker_message: "ok".into(),
                raw_response: serde_json::json!({}),
                simulated: false,
            })
        }
    }

    fn position(symbol: &str, qty: u64, avg: Decimal, current: Decimal) -> Position {
        Position {
            symbol: symbol.to_string(),
            display_name: format!("{symbol} corp"),
            quantity: qty,
            sellable_quantity: qty,
            average_price: avg,
            current_price: current,
            evaluation_amount: current * Decimal::from(qty),
            unrealized_pnl: (current - avg) * Decimal::from(qty),
            unrealized_pnl_rate: Decimal::ZERO,
        }
    }

    fn snapshot(positions: Vec<Position>) -> AccountSnapshot {
        let map: HashMap<String, Position> = positions.into_iter().map(|p| (p.symbol.clone(), p)).collect();
        AccountSnapshot {
            taken_at: Utc::now(),
            cash_balance: dec!(0),
            available_cash: dec!(0),
            total_evaluation: dec!(0),
            realized_pnl: dec!(0),
            pnl_rate: dec!(0),
            positions: map,
            pending_orders: vec![],
            stale: false,
        }
    }

    #[tokio::test]
    async fn minimal_policy_places_no_orders() {
        let execution = Arc::new(FakeExecution { calls: AtomicUsize::new(0), fail: false });
        let handler = PreviousDayBalanceHandler::new(execution.clone(), CarryOverPolicy::Minimal);
        let snap = snapshot(vec![position("005930", 10, dec!(50000), dec!(55000))]);
        let outcomes = handler.run(&snap).await;
        assert!(outcomes.is_empty());
        assert_eq!(execution.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn day_trading_policy_liquidates_unretained_positions_with_real_pnl() {
        let execution = Arc::new(FakeExecution { calls: AtomicUsize::new(0), fail: false });
        let handler = PreviousDayBalanceHandler::new(
            execution.clone(),
            CarryOverPolicy::DayTrading { retention_rules: vec![] },
        );
        let snap = snapshot(vec![position("005930", 10, dec!(50000), dec!(55000))]);
        let outcomes = handler.run(&snap).await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].side, Side::Sell);
        assert_eq!(outcomes[0].realized_pnl, Some(dec!(50000)));
        assert_eq!(execution.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retention_rule_skips_matching_symbol() {
        let execution = Arc::new(FakeExecution { calls: AtomicUsize::new(0), fail: false });
        let handler = PreviousDayBalanceHandler::new(
            execution.clone(),
            CarryOverPolicy::DayTrading {
                retention_rules: vec![RetentionRule { symbol: "005930".into() }],
            },
        );
        let snap = snapshot(vec![position("005930", 10, dec!(50000), dec!(55000))]);
        let outcomes = handler.run(&snap).await;
        assert!(outcomes.is_empty());
        assert_eq!(execution.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_liquidation_is_recorded_not_accepted() {
        let execution = Arc::new(FakeExecution { calls: AtomicUsize::new(0), fail: true });
        let handler = PreviousDayBalanceHandler::new(
            execution,
            CarryOverPolicy::DayTrading { retention_rules: vec![] },
        );
        let snap = snapshot(vec![position("005930", 10, dec!(50000), dec!(55000))]);
        let outcomes = handler.run(&snap).await;
        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].accepted);
        assert!(outcomes[0].realized_pnl.is_none());
    }
}
