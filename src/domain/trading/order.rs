use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceMode {
    Market,
    Limit,
}

#[derive(Debug, Error)]
pub enum OrderValidationError {
    #[error("quantity must be greater than zero, got {0}")]
    NonPositiveQuantity(u64),
    #[error("symbol must be a 6-character alphanumeric code, got `{0}`")]
    InvalidSymbol(String),
    #[error("limit price is required for LIMIT orders")]
    MissingLimitPrice,
}

/// A request to buy or sell a symbol. `symbol` must be a 6-character
/// alphanumeric code (KRX listing code shape); for `PriceMode::Market`
/// `limit_price` is always `None` on the wire (the field is zeroed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: u64,
    pub price_mode: PriceMode,
    pub limit_price: Option<Decimal>,
}

impl OrderRequest {
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: u64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            price_mode: PriceMode::Market,
            limit_price: None,
        }
    }

    /// Validated at the API client boundary before any network call is
    /// made -- a rejected order never reaches the rate limiter.
    pub fn validate(&self) -> Result<(), OrderValidationError> {
        if self.quantity == 0 {
            return Err(OrderValidationError::NonPositiveQuantity(self.quantity));
        }
        if self.symbol.len() != 6 || !self.symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(OrderValidationError::InvalidSymbol(self.symbol.clone()));
        }
        if self.price_mode == PriceMode::Limit && self.limit_price.is_none() {
            return Err(OrderValidationError::MissingLimitPrice);
        }
        Ok(())
    }
}

/// The broker's response to an order submission.
///
/// `accepted` iff `broker_code` is `"0"` or `"1"` AND the transport call
/// itself returned HTTP 200. `simulated` is `true` only when the local
/// "diagnostic mode" feature switch downgraded submission to a synthetic
/// acknowledgment without transmitting the order -- callers MUST check
/// this flag before applying the result as a real fill (see
/// [`crate::application::account_state_manager`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub accepted: bool,
    pub order_id: Option<String>,
    pub broker_code: String,
    pub broker_message: String,
    pub raw_response: serde_json::Value,
    pub simulated: bool,
}

impl OrderResult {
    pub fn is_success_code(broker_code: &str) -> bool {
        broker_code == "0" || broker_code == "1"
    }

    pub fn simulated_ack(order_id: String, raw: serde_json::Value) -> Self {
        Self {
            accepted: true,
            order_id: Some(order_id),
            broker_code: "0".to_string(),
            broker_message: "simulated acknowledgment (execution disabled)".to_string(),
            raw_response: raw,
            simulated: true,
        }
    }
}
