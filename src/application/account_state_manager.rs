//! Owns the single mutable [`AccountSnapshot`] for one account. Every other
//! component reads it through [`AccountStateManager::get_snapshot`], which
//! hands out an `Arc` clone -- never a mutable reference.
//!
//! Staleness tracking over an `RwLock`-guarded current state, with refresh
//! coalescing via a bare [`tokio::sync::Notify`] single-flight gate rather
//! than optimistic-lock versioning.

use crate::domain::errors::ApiError;
use crate::domain::ports::{MarketReadPort, TradeNotificationPort};
use crate::domain::trading::order::OrderSide;
use crate::domain::trading::snapshot::{AccountSnapshot, Position};
use crate::infrastructure::clock::Clock;
use crate::infrastructure::kis::wire::{BalanceOutput1, BalanceOutput2};
use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

fn parse_decimal(raw: &str) -> Decimal {
    Decimal::from_str(raw.trim()).unwrap_or(Decimal::ZERO)
}

fn parse_u64(raw: &str) -> u64 {
    raw.trim().parse().unwrap_or(0)
}

fn build_snapshot(rows: Vec<BalanceOutput1>, summary: BalanceOutput2, now: chrono::DateTime<chrono::Utc>) -> AccountSnapshot {
    let positions = rows
        .into_iter()
        .filter(|r| parse_u64(&r.hldg_qty) > 0)
        .map(|r| {
            let quantity = parse_u64(&r.hldg_qty);
            let average_price = parse_decimal(&r.pchs_avg_pric);
            let current_price = parse_decimal(&r.prpr);
            let evaluation_amount = parse_decimal(&r.evlu_amt);
            let unrealized_pnl = parse_decimal(&r.evlu_pfls_amt);
            let unrealized_pnl_rate = parse_decimal(&r.evlu_pfls_rt) / Decimal::from(100);
            let position = Position {
                symbol: r.pdno.clone(),
                display_name: r.prdt_name,
                quantity,
                sellable_quantity: parse_u64(&r.ord_psbl_qty),
                average_price,
                current_price,
                evaluation_amount,
                unrealized_pnl,
                unrealized_pnl_rate,
            };
            (r.pdno, position)
        })
        .collect::<HashMap<_, _>>();

    AccountSnapshot {
        taken_at: now,
        cash_balance: parse_decimal(&summary.dnca_tot_amt),
        available_cash: parse_decimal(&summary.nxdy_excc_amt),
        total_evaluation: parse_decimal(&summary.tot_evlu_amt),
        realized_pnl: parse_decimal(&summary.evlu_pfls_smtl_amt),
        pnl_rate: Decimal::ZERO,
        positions,
        pending_orders: Vec::new(),
        stale: false,
    }
}

pub struct AccountStateManager {
    market: Arc<dyn MarketReadPort>,
    clock: Arc<dyn Clock>,
    refresh_interval: ChronoDuration,
    state: RwLock<Arc<AccountSnapshot>>,
    in_flight: Mutex<Option<Arc<Notify>>>,
    background_task: Mutex<Option<JoinHandle<()>>>,
    settle_delay: std::time::Duration,
    /// Weak self-reference, set once right after construction, so
    /// `notify_trade_completed` (which only gets `&self` through the
    /// [`TradeNotificationPort`] trait) can still spawn a detached task
    /// that outlives the call instead of blocking the caller on the
    /// settle delay.
    self_weak: std::sync::OnceLock<std::sync::Weak<AccountStateManager>>,
}

impl AccountStateManager {
    pub async fn new(
        market: Arc<dyn MarketReadPort>,
        clock: Arc<dyn Clock>,
        refresh_interval: std::time::Duration,
    ) -> Result<Arc<Self>, ApiError> {
        let now = clock.now();
        let initial = match market.get_account_balance().await {
            Ok((rows, summary)) => build_snapshot(rows, summary, now),
            Err(e) => return Err(e),
        };

        let this = Arc::new(Self {
            market,
            clock,
            refresh_interval: ChronoDuration::from_std(refresh_interval)
                .unwrap_or_else(|_| ChronoDuration::seconds(300)),
            state: RwLock::new(Arc::new(initial)),
            in_flight: Mutex::new(None),
            background_task: Mutex::new(None),
            settle_delay: std::time::Duration::from_millis(500),
            self_weak: std::sync::OnceLock::new(),
        });
        let _ = this.self_weak.set(Arc::downgrade(&this));
        Ok(this)
    }
}

impl AccountStateManager {
    /// Spawns the periodic background refresh. Idempotent: calling twice
    /// replaces (and implicitly stops polling via drop of) the prior handle.
    pub async fn start_session(self: &Arc<Self>) {
        let interval = self
            .refresh_interval
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(300));
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(this) = weak.upgrade() else { return };
                if let Err(e) = this.refresh().await {
                    warn!(error = %e, "background account refresh failed, keeping prior snapshot");
                }
            }
        });
        *self.background_task.lock().await = Some(handle);
    }

    pub async fn end_session(&self) {
        if let Some(handle) = self.background_task.lock().await.take() {
            handle.abort();
        }
    }

    /// Forces a refresh, coalescing concurrent callers onto a single
    /// in-flight request via a [`Notify`] gate.
    async fn refresh(&self) -> Result<(), ApiError> {
        let notify = {
            let mut guard = self.in_flight.lock().await;
            if let Some(existing) = guard.as_ref() {
                let existing = existing.clone();
                drop(guard);
                existing.notified().await;
                return Ok(());
            }
            let notify = Arc::new(Notify::new());
            *guard = Some(notify.clone());
            notify
        };

        let result = self.market.get_account_balance().await;
        let outcome = match result {
            Ok((rows, summary)) => {
                let snapshot = build_snapshot(rows, summary, self.clock.now());
                *self.state.write().await = Arc::new(snapshot);
                debug!("account snapshot refreshed");
                Ok(())
            }
            Err(e) => {
                let mut guard = self.state.write().await;
                let mut stale = (**guard).clone();
                stale.stale = true;
                *guard = Arc::new(stale);
                error!(error = %e, "account refresh failed, retaining previous snapshot");
                Err(e)
            }
        };

        *self.in_flight.lock().await = None;
        notify.notify_waiters();
        outcome
    }

    /// Returns the current snapshot. With `force`, blocks until a fresh
    /// refresh completes (or fails, in which case the retained snapshot is
    /// returned with `stale = true`). Without `force`, a snapshot younger
    /// than one second short-circuits the call outright -- no staleness
    /// check, no lock contention beyond the read below -- and otherwise
    /// refreshes only if the snapshot has aged past `refresh_interval`.
    pub async fn get_snapshot(&self, force: bool) -> Arc<AccountSnapshot> {
        if !force {
            let guard = self.state.read().await;
            if self.clock.now() - guard.taken_at < ChronoDuration::seconds(1) {
                return Arc::clone(&guard);
            }
        }

        let needs_refresh = force || {
            let guard = self.state.read().await;
            !guard.is_fresh(self.clock.now(), self.refresh_interval)
        };

        if needs_refresh {
            let _ = self.refresh().await;
        }

        Arc::clone(&*self.state.read().await)
    }
}

#[async_trait]
impl TradeNotificationPort for AccountStateManager {
    /// Schedules a refresh shortly after a real fill settles, rather than
    /// blocking the caller (the API client) on the refresh itself: the
    /// settle delay and the refresh both run in a detached task off a
    /// weak self-reference, so the client's order-placement call returns
    /// immediately.
    async fn notify_trade_completed(&self, side: OrderSide, symbol: &str, accepted: bool) {
        if !accepted {
            return;
        }
        let Some(weak) = self.self_weak.get() else {
            warn!(symbol, "account state manager has no self-reference yet, skipping post-fill refresh");
            return;
        };
        let Some(this) = weak.upgrade() else { return };
        let symbol = symbol.to_string();
        let delay = self.settle_delay;
        info!(side = %side, symbol, "scheduling account refresh after fill");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = this.refresh().await {
                warn!(error = %e, symbol, "post-fill refresh failed");
            }
        });
    }
}
