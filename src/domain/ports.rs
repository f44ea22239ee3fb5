//! Narrow trait seams between the application layer and the broker
//! client, so collaborators depend on only the capability they need
//! instead of the full [`crate::infrastructure::kis::ApiClient`].

use crate::domain::errors::ApiError;
use crate::domain::trading::order::{OrderRequest, OrderResult, OrderSide};
use crate::infrastructure::kis::wire::{BalanceOutput1, BalanceOutput2, CandleRow, QuoteOutput, RankingRow};
use async_trait::async_trait;

/// Everything the account state manager and candidate provider need:
/// read-only broker calls. Deliberately excludes order placement so a
/// component holding only this trait object can never submit a trade.
#[async_trait]
pub trait MarketReadPort: Send + Sync {
    async fn get_quote(&self, symbol: &str) -> Result<QuoteOutput, ApiError>;
    async fn get_daily_candles(&self, symbol: &str) -> Result<Vec<CandleRow>, ApiError>;
    async fn get_minute_candles(&self, symbol: &str) -> Result<Vec<CandleRow>, ApiError>;
    async fn get_top_gainers(&self) -> Result<Vec<RankingRow>, ApiError>;
    async fn get_account_balance(&self) -> Result<(Vec<BalanceOutput1>, BalanceOutput2), ApiError>;
}

/// Order submission, held only by the trading cycle engine.
#[async_trait]
pub trait ExecutionPort: Send + Sync {
    async fn place_buy_order(&self, req: &OrderRequest) -> Result<OrderResult, ApiError>;
    async fn place_sell_order(&self, req: &OrderRequest) -> Result<OrderResult, ApiError>;
}

/// The one callback the API client holds into the account state manager:
/// schedule a refresh after a real (non-simulated) fill. Kept separate
/// from [`MarketReadPort`]/[`ExecutionPort`] so the dependency the other
/// direction -- client notifying the manager -- never needs the manager's
/// full surface, only this one method.
#[async_trait]
pub trait TradeNotificationPort: Send + Sync {
    async fn notify_trade_completed(&self, side: OrderSide, symbol: &str, accepted: bool);
}
