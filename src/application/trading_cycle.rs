//! The outer trading loop and the per-cycle decision pass.
//!
//! Grounded on the teacher's `agents/executor.rs` (sequential decide→submit
//! orchestration, one symbol at a time) and `application/system.rs` (the
//! shape of the top-level loop), adapted to this engine's single
//! strategy-per-session model and its sell-precedence/position-sizing
//! rules.

use crate::application::account_state_manager::AccountStateManager;
use crate::application::candidate_provider::CandidateProvider;
use crate::application::system::{ScheduleController, ShutdownService, StopState};
use crate::application::telemetry::{TelemetryEvent, TelemetryHub};
use crate::config::EngineConfig;
use crate::domain::account::Account;
use crate::domain::cycle_report::{CycleReport, SessionStats, TradeOutcome};
use crate::domain::errors::ApiError;
use crate::domain::ports::{ExecutionPort, MarketReadPort};
use crate::domain::strategy::{Candle, Signal, StockData, Strategy};
use crate::domain::trading::order::{OrderRequest, OrderSide};
use crate::domain::trading::snapshot::AccountSnapshot;
use anyhow::Result;
use futures::future::join_all;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SellReason {
    StopLoss,
    TakeProfit,
    Strategy,
}

impl SellReason {
    fn label(self) -> &'static str {
        match self {
            SellReason::StopLoss => "stop-loss triggered",
            SellReason::TakeProfit => "take-profit triggered",
            SellReason::Strategy => "strategy signaled SELL",
        }
    }
}

/// Ordered precedence: stop-loss, then take-profit, then a strategy SELL
/// signal, then hold. Implemented as an explicit if-chain, not a sorted
/// comparison, so the order can never silently drift.
fn sell_reason(profit_rate: Decimal, stop_loss_pct: Decimal, take_profit_pct: Decimal, strategy_signal: Signal) -> Option<SellReason> {
    if profit_rate <= stop_loss_pct {
        Some(SellReason::StopLoss)
    } else if profit_rate >= take_profit_pct {
        Some(SellReason::TakeProfit)
    } else if strategy_signal == Signal::Sell {
        Some(SellReason::Strategy)
    } else {
        None
    }
}

/// `quantity = floor(min(available_cash * ratio, available_cash) / price)`,
/// zero if `price` isn't positive.
fn position_size(available_cash: Decimal, ratio: Decimal, price: Decimal) -> u64 {
    if price <= Decimal::ZERO {
        return 0;
    }
    let position_value = (available_cash * ratio).min(available_cash);
    (position_value / price)
        .floor()
        .to_u64()
        .unwrap_or(0)
}

fn parse_candle_timestamp(raw: &str) -> chrono::DateTime<chrono::Utc> {
    if raw.len() >= 12 {
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(&raw[..12], "%Y%m%d%H%M") {
            return naive.and_utc();
        }
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(&raw[..raw.len().min(8)], "%Y%m%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return naive.and_utc();
        }
    }
    chrono::Utc::now()
}

fn parse_decimal(raw: &str) -> Decimal {
    Decimal::from_str(raw.trim()).unwrap_or(Decimal::ZERO)
}

fn to_domain_candle(row: crate::infrastructure::kis::wire::CandleRow) -> Candle {
    Candle {
        timestamp: parse_candle_timestamp(&row.stck_bsop_date),
        open: parse_decimal(&row.stck_oprc),
        high: parse_decimal(&row.stck_hgpr),
        low: parse_decimal(&row.stck_lwpr),
        close: parse_decimal(&row.stck_clpr),
        volume: row.acml_vol.trim().parse().unwrap_or(0),
    }
}

pub struct SessionSummary {
    pub cycles_completed: u64,
    pub session_stats: SessionStats,
}

pub struct TradingCycleEngine {
    account: Account,
    market: Arc<dyn MarketReadPort>,
    execution: Arc<dyn ExecutionPort>,
    account_state: Arc<AccountStateManager>,
    candidate_provider: CandidateProvider,
    strategy: Arc<dyn Strategy>,
    schedule: Arc<ScheduleController>,
    shutdown: ShutdownService,
    telemetry: Arc<TelemetryHub>,
    config: EngineConfig,
    stats: StdMutex<SessionStats>,
    /// Set when the candidate provider's ranking feed is terminally
    /// unavailable (`server_unresponsive`, spec.md §4.F) -- checked at the
    /// top of `run_session`'s loop to end the session.
    server_unresponsive: AtomicBool,
}

impl TradingCycleEngine {
    pub fn new(
        account: Account,
        market: Arc<dyn MarketReadPort>,
        execution: Arc<dyn ExecutionPort>,
        account_state: Arc<AccountStateManager>,
        candidate_provider: CandidateProvider,
        strategy: Arc<dyn Strategy>,
        schedule: Arc<ScheduleController>,
        telemetry: Arc<TelemetryHub>,
        config: EngineConfig,
    ) -> Self {
        Self {
            account,
            market,
            execution: execution.clone(),
            account_state,
            candidate_provider,
            strategy,
            schedule,
            shutdown: ShutdownService::new(execution),
            telemetry,
            config,
            stats: StdMutex::new(SessionStats::default()),
            server_unresponsive: AtomicBool::new(false),
        }
    }

    async fn fetch_stock_data(&self, symbol: &str) -> Option<StockData> {
        let (quote, daily, minute) = tokio::join!(
            self.market.get_quote(symbol),
            self.market.get_daily_candles(symbol),
            self.market.get_minute_candles(symbol)
        );

        let quote = match quote {
            Ok(q) => q,
            Err(e) => {
                warn!(symbol, error = %e, "quote fetch failed, skipping symbol this cycle");
                return None;
            }
        };

        Some(StockData {
            symbol: symbol.to_string(),
            last_price: parse_decimal(&quote.stck_prpr),
            daily_candles: daily.unwrap_or_default().into_iter().map(to_domain_candle).collect(),
            minute_candles: minute.unwrap_or_default().into_iter().map(to_domain_candle).collect(),
        })
    }

    /// Fetches quote/candle data for every symbol concurrently and
    /// aggregates the results before any decision is made -- order
    /// submission itself stays strictly sequential.
    async fn gather_stock_data(&self, symbols: &[String]) -> HashMap<String, StockData> {
        let fetches = symbols.iter().map(|s| self.fetch_stock_data(s));
        let results = join_all(fetches).await;
        symbols
            .iter()
            .cloned()
            .zip(results)
            .filter_map(|(symbol, data)| data.map(|d| (symbol, d)))
            .collect()
    }

    async fn evaluate_sells(&self, snapshot: &AccountSnapshot, data: &HashMap<String, StockData>) -> Vec<TradeOutcome> {
        let stop_loss_pct = Decimal::from_f64(self.config.stop_loss_pct).unwrap_or(Decimal::ZERO);
        let take_profit_pct = Decimal::from_f64(self.config.take_profit_pct).unwrap_or(Decimal::ZERO);

        let mut outcomes = Vec::new();
        for position in snapshot.positions.values() {
            if position.sellable_quantity == 0 {
                continue;
            }
            let Some(stock_data) = data.get(&position.symbol) else {
                continue;
            };
            let decision = self.strategy.analyze(stock_data, &position.symbol);
            let Some(reason) = sell_reason(position.profit_rate(), stop_loss_pct, take_profit_pct, decision.signal) else {
                continue;
            };

            let request = OrderRequest::market(position.symbol.clone(), OrderSide::Sell, position.sellable_quantity);
            let outcome = self
                .submit_order(request, reason.label().to_string(), position.current_price, Some(position.average_price))
                .await;
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn evaluate_buys(
        &self,
        snapshot: &AccountSnapshot,
        candidate_symbols: &[String],
        data: &HashMap<String, StockData>,
        sells_accepted_this_cycle: usize,
    ) -> Vec<TradeOutcome> {
        if !self.schedule.entries_allowed() || self.schedule.in_close_guard() {
            return Vec::new();
        }

        let ratio = Decimal::from_f64(self.config.position_size_ratio).unwrap_or(Decimal::ZERO);
        let mut open_positions = snapshot.positions.len().saturating_sub(sells_accepted_this_cycle);
        let mut outcomes = Vec::new();

        for symbol in candidate_symbols {
            if open_positions >= self.config.max_positions {
                break;
            }
            if snapshot.has_position(symbol) {
                continue;
            }
            let Some(stock_data) = data.get(symbol) else {
                continue;
            };
            let decision = self.strategy.analyze(stock_data, symbol);
            if decision.signal != Signal::Buy {
                continue;
            }
            if decision.confidence <= self.config.buy_confidence_threshold {
                continue;
            }

            let quantity = position_size(snapshot.available_cash, ratio, stock_data.last_price);
            if quantity == 0 {
                continue;
            }

            let request = OrderRequest::market(symbol.clone(), OrderSide::Buy, quantity);
            let outcome = self.submit_order(request, decision.reason, stock_data.last_price, None).await;
            if outcome.accepted {
                open_positions += 1;
            }
            outcomes.push(outcome);
        }
        outcomes
    }

    /// `average_price` is `Some` only for sell orders, where it lets an
    /// accepted fill's realized pnl be computed as
    /// `(reference_price - average_price) * quantity`; buy orders always
    /// pass `None` and report no realized pnl.
    async fn submit_order(
        &self,
        request: OrderRequest,
        reason: String,
        reference_price: Decimal,
        average_price: Option<Decimal>,
    ) -> TradeOutcome {
        let side = request.side;
        let symbol = request.symbol.clone();
        let quantity = request.quantity;

        let result = match side {
            OrderSide::Buy => self.execution.place_buy_order(&request).await,
            OrderSide::Sell => self.execution.place_sell_order(&request).await,
        };

        let outcome = match result {
            Ok(order_result) => {
                self.telemetry.publish(TelemetryEvent::OrderPlaced {
                    side,
                    symbol: symbol.clone(),
                    quantity,
                    price: reference_price,
                    accepted: order_result.accepted,
                });
                let realized_pnl = if order_result.accepted {
                    average_price.map(|avg| (reference_price - avg) * Decimal::from(quantity))
                } else {
                    None
                };
                TradeOutcome {
                    symbol,
                    side,
                    quantity,
                    price: reference_price,
                    accepted: order_result.accepted,
                    broker_message: order_result.broker_message,
                    realized_pnl,
                    reason,
                }
            }
            Err(e) => {
                if e.is_unknown_outcome() {
                    let _ = self.account_state.get_snapshot(true).await;
                }
                self.telemetry.publish(TelemetryEvent::Error {
                    kind: "order_submission".to_string(),
                    message: e.to_string(),
                });
                TradeOutcome {
                    symbol,
                    side,
                    quantity,
                    price: reference_price,
                    accepted: false,
                    broker_message: e.to_string(),
                    realized_pnl: None,
                    reason,
                }
            }
        };
        outcome
    }

    pub async fn run_cycle(&self, cycle_number: u64) -> CycleReport {
        let snapshot = self.account_state.get_snapshot(cycle_number == 1).await;
        let held: Vec<String> = snapshot.positions.keys().cloned().collect();

        let candidates = if self.schedule.entries_allowed() {
            match self.candidate_provider.select_candidates(&held).await {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!(error = %e, "candidate ranking feed unresponsive, ending session after this cycle");
                    self.server_unresponsive.store(true, Ordering::SeqCst);
                    self.telemetry.publish(TelemetryEvent::Error {
                        kind: "server_unresponsive".to_string(),
                        message: e.to_string(),
                    });
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };
        let candidate_symbols: Vec<String> = candidates.iter().map(|c| c.symbol.clone()).collect();

        let mut all_symbols = held.clone();
        for symbol in &candidate_symbols {
            if !all_symbols.contains(symbol) {
                all_symbols.push(symbol.clone());
            }
        }

        let data = self.gather_stock_data(&all_symbols).await;

        let sell_outcomes = self.evaluate_sells(&snapshot, &data).await;
        let sells_accepted = sell_outcomes.iter().filter(|o| o.accepted).count();
        let buy_outcomes = self
            .evaluate_buys(&snapshot, &candidate_symbols, &data, sells_accepted)
            .await;

        let mut report = CycleReport::new(cycle_number, snapshot.cash_balance, snapshot.positions.len());
        {
            let mut stats = self.stats.lock().expect("session stats mutex poisoned");
            stats.cycles_completed += 1;
            stats.sells_submitted += sell_outcomes.iter().filter(|o| o.accepted).count() as u64;
            stats.buys_submitted += buy_outcomes.iter().filter(|o| o.accepted).count() as u64;
            stats.orders_rejected += sell_outcomes.iter().chain(buy_outcomes.iter()).filter(|o| !o.accepted).count() as u64;
            report.session_stats = stats.clone();
        }
        report.sell_outcomes = sell_outcomes;
        report.buy_outcomes = buy_outcomes;

        self.telemetry.publish(TelemetryEvent::CycleCompleted(report.clone()));
        report
    }

    pub async fn run_session(&self) -> Result<SessionSummary> {
        self.schedule.watch_ctrl_c();
        self.telemetry.publish(TelemetryEvent::SessionStarted);

        let initial_balance = self.account_state.get_snapshot(false).await.cash_balance;
        let initial_stats = self.stats.lock().expect("session stats mutex poisoned").clone();
        info!(message = %self.strategy.on_algorithm_start(&self.account, initial_balance, &initial_stats), "session starting");

        let mut cycle_number: u64 = 1;
        loop {
            match self.schedule.check_stop() {
                StopState::Force => {
                    warn!("forced stop requested, skipping shutdown bookkeeping");
                    break;
                }
                StopState::Cooperative => {
                    info!("cooperative stop requested");
                    break;
                }
                StopState::None => {}
            }

            if self.schedule.past_market_close() || self.strategy.should_stop_trading() {
                info!("market closed or strategy requested stop, ending session");
                break;
            }

            self.run_cycle(cycle_number).await;
            cycle_number += 1;

            if self.server_unresponsive.load(Ordering::SeqCst) {
                warn!("ending session: candidate ranking feed was unresponsive");
                break;
            }

            if self.schedule.sleep_interrupted(self.strategy.cycle_interval()).await == StopState::Force {
                warn!("forced stop requested during cycle sleep");
                return self.finish_session(cycle_number, false).await;
            }
        }

        self.finish_session(cycle_number, true).await
    }

    async fn finish_session(&self, cycle_number: u64, run_shutdown: bool) -> Result<SessionSummary> {
        let cycles_completed = cycle_number.saturating_sub(1);
        if run_shutdown {
            let snapshot = self.account_state.get_snapshot(true).await;
            self.shutdown.shutdown(&snapshot, cycles_completed).await;
        }
        self.account_state.end_session().await;

        let final_balance = self.account_state.get_snapshot(false).await.cash_balance;
        let stats = self.stats.lock().expect("session stats mutex poisoned").clone();
        info!(message = %self.strategy.on_algorithm_end(&self.account, final_balance, &stats), "session ended");
        self.telemetry.publish(TelemetryEvent::SessionEnded);
        Ok(SessionSummary {
            cycles_completed,
            session_stats: stats,
        })
    }
}
