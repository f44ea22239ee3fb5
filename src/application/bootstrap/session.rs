//! Builds and runs one trading session for one account.
//!
//! Everything is wired explicitly in one place, by value or `Arc`, so no
//! collaborator reaches for a global.

use crate::application::account_state_manager::AccountStateManager;
use crate::application::candidate_provider::{CandidateProvider, CandidateProviderConfig};
use crate::application::risk_management::{CarryOverPolicy, PreviousDayBalanceHandler};
use crate::application::strategies::StrategyFactory;
use crate::application::system::{ScheduleController, ScheduleControllerConfig};
use crate::application::telemetry::TelemetryHub;
use crate::application::trading_cycle::{SessionSummary, TradingCycleEngine};
use crate::config::{CredentialsStore, EngineConfig};
use crate::domain::account::{Account, AccountType};
use crate::domain::cycle_report::CycleReport;
use crate::domain::ports::{ExecutionPort, MarketReadPort, TradeNotificationPort};
use crate::domain::strategy::StrategyMode;
use crate::infrastructure::clock::{Clock, SystemClock};
use crate::infrastructure::kis::{ApiClient, TokenService};
use anyhow::{Context, Result};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

const TOKEN_CACHE_DIR: &str = "token_cache";

fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or(Decimal::ZERO)
}

/// Swing sessions hold positions across days by design; intraday sessions
/// flatten anything carried in from a prior day, with no retention rules
/// configured out of the box (an operator wiring real retention policy
/// would extend this at bootstrap).
fn default_carry_over_policy(mode: StrategyMode) -> CarryOverPolicy {
    match mode {
        StrategyMode::Swing => CarryOverPolicy::Minimal,
        StrategyMode::Intraday => CarryOverPolicy::DayTrading { retention_rules: Vec::new() },
    }
}

/// Owns every collaborator for one account's trading session end to end:
/// credentials, token issuance, the broker client, account state, and the
/// trading cycle engine itself.
pub struct Session {
    account: Account,
    account_state: Arc<AccountStateManager>,
    previous_day_handler: PreviousDayBalanceHandler,
    trading_cycle: TradingCycleEngine,
}

impl Session {
    /// Builds every collaborator for `account_type` running `strategy_mode`,
    /// reading credentials from `credentials_path` (or the
    /// `KIS_CONFIG_PATH`-resolved default when `None`).
    pub async fn open(
        account_type: AccountType,
        strategy_mode: StrategyMode,
        credentials_path: Option<&str>,
    ) -> Result<Self> {
        let credentials_store = match credentials_path {
            Some(path) => CredentialsStore::new(path),
            None => CredentialsStore::from_env(),
        };

        let engine_config = credentials_store
            .get_engine_config()
            .context("loading engine configuration")?;
        let account = credentials_store
            .get_fresh(account_type)
            .context("loading account credentials")?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let token_service = Arc::new(TokenService::new(TOKEN_CACHE_DIR, clock.clone()));

        let api_client = Arc::new(ApiClient::new(
            account.clone(),
            token_service.clone(),
            clock.clone(),
            engine_config.simulate_orders,
        ));

        // PAPER accounts borrow the LIVE account's top-gainers ranking feed
        // (the PAPER environment doesn't expose one); the borrowed client
        // only ever exposes read methods, never order placement.
        let ranking_source: Arc<dyn MarketReadPort> = match account_type {
            AccountType::Live => api_client.clone(),
            AccountType::Paper => {
                let live_account = credentials_store
                    .get_fresh(AccountType::Live)
                    .context("loading LIVE credentials for ranking borrow")?;
                Arc::new(ApiClient::ranking_view(live_account, token_service.clone(), clock.clone()))
            }
        };

        let market: Arc<dyn MarketReadPort> = api_client.clone();
        let execution: Arc<dyn ExecutionPort> = api_client.clone();

        let account_state = AccountStateManager::new(market.clone(), clock.clone(), engine_config.snapshot_refresh_interval())
            .await
            .context("fetching initial account snapshot")?;

        let notifier: Arc<dyn TradeNotificationPort> = account_state.clone();
        api_client.set_trade_notifier(notifier);

        let candidate_provider = CandidateProvider::new(
            market.clone(),
            ranking_source,
            CandidateProviderConfig {
                max_candidates: engine_config.max_candidates,
                price_floor: to_decimal(engine_config.candidate_price_floor),
                price_ceiling: to_decimal(engine_config.candidate_price_ceiling),
                change_rate_floor: to_decimal(engine_config.candidate_change_rate_floor),
                volume_ratio_floor: to_decimal(engine_config.candidate_volume_ratio_floor),
            },
        );

        let strategy = StrategyFactory::create(strategy_mode);

        let stop_signal_path = if engine_config.stop_signal_path == EngineConfig::default().stop_signal_path {
            strategy_mode.default_stop_signal_file().to_string()
        } else {
            engine_config.stop_signal_path.clone()
        };
        let schedule = Arc::new(ScheduleController::new(
            ScheduleControllerConfig::from_engine_config(&engine_config),
            clock.clone(),
            stop_signal_path,
        ));

        let telemetry = Arc::new(TelemetryHub::new());

        let previous_day_handler = PreviousDayBalanceHandler::new(execution.clone(), default_carry_over_policy(strategy_mode));

        let trading_cycle = TradingCycleEngine::new(
            account.clone(),
            market,
            execution,
            account_state.clone(),
            candidate_provider,
            strategy,
            schedule,
            telemetry,
            engine_config,
        );

        Ok(Self {
            account,
            account_state,
            previous_day_handler,
            trading_cycle,
        })
    }

    /// Runs the full session lifecycle: disposes of any carried-over
    /// balance from a prior session, starts the account state manager's
    /// background refresh, runs the trading loop to completion, and stops
    /// the background task again.
    pub async fn run(&self) -> Result<SessionSummary> {
        info!(account_type = %self.account.account_type, "opening session");

        self.account_state.start_session().await;

        let initial_snapshot = self.account_state.get_snapshot(false).await;
        let previous_day_outcomes = self.previous_day_handler.run(&initial_snapshot).await;
        if !previous_day_outcomes.is_empty() {
            let mut report = CycleReport::new(0, initial_snapshot.cash_balance, initial_snapshot.positions.len());
            report.sell_outcomes = previous_day_outcomes;
            info!(cycle = 0, sell_count = report.sell_outcomes.len(), "previous-day balance handling complete");
        }

        let summary = self.trading_cycle.run_session().await;
        self.account_state.end_session().await;
        summary
    }

    pub fn account_type(&self) -> AccountType {
        self.account.account_type
    }
}
