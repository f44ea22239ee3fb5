use crate::domain::account::{Account, AccountType};
use crate::domain::errors::{ApiError, ClientError, NetworkError, ServerError};
use crate::domain::ports::TradeNotificationPort;
use crate::domain::trading::order::{OrderRequest, OrderResult, OrderSide, PriceMode};
use crate::infrastructure::clock::Clock;
use crate::infrastructure::kis::rate_limiter::RateLimiter;
use crate::infrastructure::kis::token_service::TokenService;
use crate::infrastructure::kis::tr_id::{self, Operation};
use crate::infrastructure::kis::wire::{
    BalanceOutput1, BalanceOutput2, BalanceResponse, CandleResponse, CandleRow, OrderResponse,
    QuoteOutput, QuoteResponse, RankingResponse, RankingRow,
};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::warn;

const READ_MAX_ATTEMPTS: u32 = 5;
const ORDER_MAX_ATTEMPTS: u32 = 3;

/// How a completed call should be handled next, derived from HTTP status
/// and response body without any knowledge of retry bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    /// HTTP 200 with a rate-limit phrase, or bare HTTP 429.
    /// Backoff: `min(2^attempt, 10)s`.
    RateLimited,
    /// HTTP 500 carrying the broker's `EGW00201` rate-limit code. Kept
    /// distinct from generic 5xx handling per spec -- this is a
    /// first-class classification, not an afterthought.
    /// Backoff: `min(2^attempt, 15)s`.
    RateLimitedServer,
    /// HTTP 500 without a rate-limit code. Backoff: `5*(attempt+1)s`.
    RetryableServer,
    /// HTTP 4xx other than 429. Never retried.
    Client,
}

/// Pure classification of one response. The broker reuses HTTP 200 for a
/// rate-limit notice (distinguished only by phrasing in the body) and HTTP
/// 500 for both a genuine server fault and a rate-limit code
/// (`EGW00201`), so status code alone is never sufficient.
fn classify(status: u16, body: &str) -> Outcome {
    if status == 429 {
        return Outcome::RateLimited;
    }
    if status == 200 {
        if body.contains("초당 거래건수") || body.contains("거래건수를 초과") {
            return Outcome::RateLimited;
        }
        return Outcome::Success;
    }
    if status == 500 {
        if body.contains("EGW00201") {
            return Outcome::RateLimitedServer;
        }
        return Outcome::RetryableServer;
    }
    if status >= 500 {
        return Outcome::RetryableServer;
    }
    Outcome::Client
}

fn extract_broker_code(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value.get("msg_cd")?.as_str().map(str::to_string)
}

/// Backoff for the HTTP-200-rate-limit-phrase and HTTP-429 rows.
fn rate_limit_backoff(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt).min(10))
}

/// Backoff for the HTTP-500/`EGW00201` row -- a wider cap than the plain
/// rate-limit row because the broker-side condition it signals tends to
/// clear more slowly.
fn rate_limit_server_backoff(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt).min(15))
}

/// Backoff for "HTTP 500 otherwise".
fn server_error_backoff(attempt: u32) -> Duration {
    Duration::from_secs(5 * (attempt as u64 + 1))
}

/// Backoff for transport timeout/connection reset. Order placement gets a
/// longer multiplier than reads because a dropped connection mid-order
/// warrants more breathing room before resubmission.
fn network_error_backoff(attempt: u32, is_order: bool) -> Duration {
    let multiplier = if is_order { 10 } else { 3 };
    Duration::from_secs(multiplier * (attempt as u64 + 1))
}

/// Ties the token service, rate limiter, and TR-ID table together into
/// the one place that talks HTTP to the broker. Every public method
/// validates, rate-limits, attaches a fresh bearer token, retries
/// according to [`classify`], and returns a domain type -- callers never
/// see a raw [`reqwest::Response`].
pub struct ApiClient {
    http: reqwest::Client,
    account: Account,
    token_service: Arc<TokenService>,
    rate_limiter: RateLimiter,
    clock: Arc<dyn Clock>,
    simulate_orders: bool,
    /// Set once by the session bootstrap after the account state manager
    /// exists, breaking the client/manager construction cycle (see
    /// [`TradeNotificationPort`]). `None` until then -- harmless, since no
    /// real fill can occur before bootstrap completes.
    trade_notifier: OnceLock<Arc<dyn TradeNotificationPort>>,
}

impl ApiClient {
    pub fn new(
        account: Account,
        token_service: Arc<TokenService>,
        clock: Arc<dyn Clock>,
        simulate_orders: bool,
    ) -> Self {
        let rate_limiter = RateLimiter::for_account_type(account.account_type, clock.clone());
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            account,
            token_service,
            rate_limiter,
            clock,
            simulate_orders,
            trade_notifier: OnceLock::new(),
        }
    }

    /// Wires the account state manager callback in after both have been
    /// constructed. A no-op if called more than once.
    pub fn set_trade_notifier(&self, notifier: Arc<dyn TradeNotificationPort>) {
        let _ = self.trade_notifier.set(notifier);
    }

    fn base_url(&self) -> &str {
        &self.account.rest_base_url
    }

    async fn send_with_retry(
        &self,
        operation: Operation,
        max_attempts: u32,
        is_order: bool,
        build: impl Fn(&reqwest::Client, &str, &str) -> reqwest::RequestBuilder,
    ) -> Result<serde_json::Value, ApiError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.rate_limiter.acquire().await;
            let token = self.token_service.get_valid(&self.account).await?;
            let tr_id = tr_id::tr_id(operation, self.account.account_type);

            let request = build(&self.http, self.base_url(), tr_id)
                .header("authorization", token.bearer_header())
                .header("appkey", &self.account.app_key)
                .header("appsecret", &self.account.app_secret)
                .header("tr_id", tr_id)
                .header("custtype", "P");

            let sent = request.send().await;
            let (status, body_text) = match sent {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let text = resp.text().await.unwrap_or_default();
                    (status, text)
                }
                Err(e) => {
                    if attempt >= max_attempts {
                        return Err(ApiError::Network(NetworkError(e.to_string())));
                    }
                    warn!(attempt, is_order, error = %e, "transport failure, retrying");
                    if is_order {
                        // "session-reset": force a fresh token before resubmitting
                        // an order after a dropped connection.
                        let _ = self.token_service.force_refresh(&self.account).await;
                    }
                    self.clock.sleep(network_error_backoff(attempt, is_order)).await;
                    continue;
                }
            };

            self.rate_limiter.record_call(status);

            match classify(status, &body_text) {
                Outcome::Success => {
                    return Ok(serde_json::from_str(&body_text).unwrap_or(serde_json::Value::Null));
                }
                Outcome::RateLimited => {
                    if attempt >= max_attempts {
                        return Err(ApiError::Server(ServerError {
                            message: body_text,
                            broker_code: extract_broker_code(&body_text),
                        }));
                    }
                    self.clock.sleep(rate_limit_backoff(attempt)).await;
                }
                Outcome::RateLimitedServer => {
                    if attempt >= max_attempts {
                        return Err(ApiError::Server(ServerError {
                            message: body_text,
                            broker_code: extract_broker_code(&body_text),
                        }));
                    }
                    self.clock.sleep(rate_limit_server_backoff(attempt)).await;
                }
                Outcome::RetryableServer => {
                    if attempt >= max_attempts {
                        return Err(ApiError::Server(ServerError {
                            message: body_text,
                            broker_code: extract_broker_code(&body_text),
                        }));
                    }
                    self.clock.sleep(server_error_backoff(attempt)).await;
                }
                Outcome::Client => {
                    return Err(ApiError::Client(ClientError {
                        status,
                        broker_code: extract_broker_code(&body_text),
                        message: body_text,
                    }));
                }
            }
        }
    }

    pub async fn get_quote(&self, symbol: &str) -> Result<QuoteOutput, ApiError> {
        let symbol = symbol.to_string();
        let raw = self
            .send_with_retry(Operation::Quote, READ_MAX_ATTEMPTS, false, move |http, base, _tr_id| {
                http.get(format!("{base}/uapi/domestic-stock/v1/quotations/inquire-price"))
                    .query(&[
                        ("FID_COND_MRKT_DIV_CODE", "J"),
                        ("FID_INPUT_ISCD", symbol.as_str()),
                    ])
            })
            .await?;

        let parsed: QuoteResponse = serde_json::from_value(raw)
            .map_err(|e| ApiError::Client(ClientError { status: 200, broker_code: None, message: e.to_string() }))?;
        parsed.output.ok_or_else(|| {
            ApiError::Client(ClientError {
                status: 200,
                broker_code: None,
                message: "quote response had no output block".to_string(),
            })
        })
    }

    async fn get_candles(&self, operation: Operation, path: &str, symbol: &str) -> Result<Vec<CandleRow>, ApiError> {
        let symbol = symbol.to_string();
        let path = path.to_string();
        let raw = self
            .send_with_retry(operation, READ_MAX_ATTEMPTS, false, move |http, base, _tr_id| {
                http.get(format!("{base}{path}")).query(&[
                    ("FID_COND_MRKT_DIV_CODE", "J"),
                    ("FID_INPUT_ISCD", symbol.as_str()),
                ])
            })
            .await?;

        let parsed: CandleResponse = serde_json::from_value(raw)
            .map_err(|e| ApiError::Client(ClientError { status: 200, broker_code: None, message: e.to_string() }))?;
        Ok(parsed.output2)
    }

    pub async fn get_daily_candles(&self, symbol: &str) -> Result<Vec<CandleRow>, ApiError> {
        self.get_candles(
            Operation::DailyCandles,
            "/uapi/domestic-stock/v1/quotations/inquire-daily-price",
            symbol,
        )
        .await
    }

    pub async fn get_minute_candles(&self, symbol: &str) -> Result<Vec<CandleRow>, ApiError> {
        self.get_candles(
            Operation::MinuteCandles,
            "/uapi/domestic-stock/v1/quotations/inquire-time-itemchartprice",
            symbol,
        )
        .await
    }

    /// The broker's top-gainers ranking feed exists only on the LIVE
    /// environment; callers on a PAPER account must still pass the LIVE
    /// account here for this one call (see candidate provider).
    pub async fn get_top_gainers(&self) -> Result<Vec<RankingRow>, ApiError> {
        let raw = self
            .send_with_retry(Operation::TopGainersRanking, READ_MAX_ATTEMPTS, false, |http, base, _tr_id| {
                http.get(format!("{base}/uapi/domestic-stock/v1/ranking/fluctuation"))
                    .query(&[("FID_COND_MRKT_DIV_CODE", "J"), ("FID_RANK_SORT_CLS_CODE", "0")])
            })
            .await?;

        let parsed: RankingResponse = serde_json::from_value(raw)
            .map_err(|e| ApiError::Client(ClientError { status: 200, broker_code: None, message: e.to_string() }))?;
        Ok(parsed.output)
    }

    pub async fn get_account_balance(&self) -> Result<(Vec<BalanceOutput1>, BalanceOutput2), ApiError> {
        let account_number = self.account.account_number.clone();
        let product_code = self.account.product_code.clone();
        let raw = self
            .send_with_retry(Operation::AccountBalance, READ_MAX_ATTEMPTS, false, move |http, base, _tr_id| {
                http.get(format!("{base}/uapi/domestic-stock/v1/trading/inquire-balance"))
                    .query(&[
                        ("CANO", account_number.as_str()),
                        ("ACNT_PRDT_CD", product_code.as_str()),
                        ("AFHR_FLPR_YN", "N"),
                        ("OFL_YN", ""),
                        ("INQR_DVSN", "02"),
                        ("UNPR_DVSN", "01"),
                        ("FUND_STTL_ICLD_YN", "N"),
                        ("FNCG_AMT_AUTO_RDPT_YN", "N"),
                        ("PRCS_DVSN", "01"),
                        ("CTX_AREA_FK100", ""),
                        ("CTX_AREA_NK100", ""),
                    ])
            })
            .await?;

        let parsed: BalanceResponse = serde_json::from_value(raw)
            .map_err(|e| ApiError::Client(ClientError { status: 200, broker_code: None, message: e.to_string() }))?;
        let summary = parsed.output2.into_iter().next().ok_or_else(|| {
            ApiError::Client(ClientError {
                status: 200,
                broker_code: None,
                message: "balance response had no output2 summary row".to_string(),
            })
        })?;
        Ok((parsed.output1, summary))
    }

    /// Requests a hashkey for an order body. Returns `None` on any
    /// failure instead of propagating it -- the order is still submitted
    /// without the header, per the graceful-degradation behavior the
    /// broker's own client libraries document.
    async fn request_hashkey(&self, body: &serde_json::Value) -> Option<String> {
        let url = format!("{}/uapi/hashkey", self.base_url());
        let response = self
            .http
            .post(url)
            .header("appkey", &self.account.app_key)
            .header("appsecret", &self.account.app_secret)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            warn!(status = %response.status(), "hashkey request failed, proceeding without it");
            return None;
        }
        let parsed: crate::infrastructure::kis::wire::HashkeyResponse = response.json().await.ok()?;
        Some(parsed.hash)
    }

    async fn place_order(&self, side: OrderSide, req: &OrderRequest) -> Result<OrderResult, ApiError> {
        if let Err(e) = req.validate() {
            return Err(ApiError::Client(ClientError {
                status: 0,
                broker_code: None,
                message: e.to_string(),
            }));
        }

        if self.simulate_orders {
            let raw = serde_json::json!({ "simulated": true, "symbol": req.symbol, "side": side.to_string() });
            return Ok(OrderResult::simulated_ack(uuid::Uuid::new_v4().to_string(), raw));
        }

        let operation = match side {
            OrderSide::Buy => Operation::BuyOrder,
            OrderSide::Sell => Operation::SellOrder,
        };

        let order_division = match req.price_mode {
            PriceMode::Market => "01",
            PriceMode::Limit => "00",
        };
        let limit_price = req
            .limit_price
            .map(|p| p.to_string())
            .unwrap_or_else(|| "0".to_string());

        let body = serde_json::json!({
            "CANO": self.account.account_number,
            "ACNT_PRDT_CD": self.account.product_code,
            "PDNO": req.symbol,
            "ORD_DVSN": order_division,
            "ORD_QTY": req.quantity.to_string(),
            "ORD_UNPR": limit_price,
        });

        let hashkey = self.request_hashkey(&body).await;
        let body_for_send = body.clone();

        let raw = self
            .send_with_retry(operation, ORDER_MAX_ATTEMPTS, true, move |http, base, _tr_id| {
                let mut builder = http
                    .post(format!("{base}/uapi/domestic-stock/v1/trading/order-cash"))
                    .json(&body_for_send);
                if let Some(hash) = &hashkey {
                    builder = builder.header("hashkey", hash.clone());
                }
                builder
            })
            .await?;

        let parsed: OrderResponse = serde_json::from_value(raw.clone())
            .map_err(|e| ApiError::Client(ClientError { status: 200, broker_code: None, message: e.to_string() }))?;

        let accepted = OrderResult::is_success_code(&parsed.envelope.rt_cd);
        if accepted {
            if let Some(notifier) = self.trade_notifier.get() {
                notifier.notify_trade_completed(side, &req.symbol, accepted).await;
            }
        }
        Ok(OrderResult {
            accepted,
            order_id: parsed.output.map(|o| o.order_id),
            broker_code: parsed.envelope.rt_cd,
            broker_message: parsed.envelope.msg1,
            raw_response: raw,
            simulated: false,
        })
    }

    pub async fn place_buy_order(&self, req: &OrderRequest) -> Result<OrderResult, ApiError> {
        self.place_order(OrderSide::Buy, req).await
    }

    pub async fn place_sell_order(&self, req: &OrderRequest) -> Result<OrderResult, ApiError> {
        self.place_order(OrderSide::Sell, req).await
    }

    pub fn account_type(&self) -> AccountType {
        self.account.account_type
    }

    /// A read-only view of this client bound to a different account's base
    /// URL/credentials for exactly one call shape -- used by the candidate
    /// provider's PAPER-borrows-LIVE-ranking rule. Only
    /// [`MarketReadPort::get_top_gainers`] is meaningful through this view;
    /// nothing routes order placement through it because `RankingView` never
    /// implements [`ExecutionPort`].
    pub fn ranking_view(live_account: Account, token_service: Arc<TokenService>, clock: Arc<dyn Clock>) -> ApiClient {
        ApiClient::new(live_account, token_service, clock, false)
    }
}

#[async_trait::async_trait]
impl crate::domain::ports::MarketReadPort for ApiClient {
    async fn get_quote(&self, symbol: &str) -> Result<QuoteOutput, ApiError> {
        ApiClient::get_quote(self, symbol).await
    }

    async fn get_daily_candles(&self, symbol: &str) -> Result<Vec<CandleRow>, ApiError> {
        ApiClient::get_daily_candles(self, symbol).await
    }

    async fn get_minute_candles(&self, symbol: &str) -> Result<Vec<CandleRow>, ApiError> {
        ApiClient::get_minute_candles(self, symbol).await
    }

    async fn get_top_gainers(&self) -> Result<Vec<RankingRow>, ApiError> {
        ApiClient::get_top_gainers(self).await
    }

    async fn get_account_balance(&self) -> Result<(Vec<BalanceOutput1>, BalanceOutput2), ApiError> {
        ApiClient::get_account_balance(self).await
    }
}

#[async_trait::async_trait]
impl crate::domain::ports::ExecutionPort for ApiClient {
    async fn place_buy_order(&self, req: &OrderRequest) -> Result<OrderResult, ApiError> {
        ApiClient::place_buy_order(self, req).await
    }

    async fn place_sell_order(&self, req: &OrderRequest) -> Result<OrderResult, ApiError> {
        ApiClient::place_sell_order(self, req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_http_200_with_rate_limit_phrase_is_rate_limited() {
        assert_eq!(
            classify(200, "초당 거래건수를 초과하였습니다"),
            Outcome::RateLimited
        );
    }

    #[test]
    fn classify_http_200_clean_body_is_success() {
        assert_eq!(classify(200, "{\"rt_cd\":\"0\"}"), Outcome::Success);
    }

    #[test]
    fn classify_http_500_with_egw00201_is_rate_limited_server() {
        assert_eq!(
            classify(500, "{\"msg_cd\":\"EGW00201\"}"),
            Outcome::RateLimitedServer
        );
    }

    #[test]
    fn classify_http_500_otherwise_is_retryable_server() {
        assert_eq!(classify(500, "{\"msg_cd\":\"APBK0013\"}"), Outcome::RetryableServer);
    }

    #[test]
    fn classify_http_429_is_rate_limited() {
        assert_eq!(classify(429, ""), Outcome::RateLimited);
    }

    #[test]
    fn classify_http_4xx_is_client() {
        assert_eq!(classify(403, "forbidden"), Outcome::Client);
    }

    #[test]
    fn rate_limit_backoff_grows_and_caps_at_10s() {
        assert!(rate_limit_backoff(1) < rate_limit_backoff(2));
        assert!(rate_limit_backoff(2) < rate_limit_backoff(3));
        assert_eq!(rate_limit_backoff(10), Duration::from_secs(10));
    }

    #[test]
    fn rate_limit_server_backoff_caps_at_15s() {
        assert_eq!(rate_limit_server_backoff(1), Duration::from_secs(2));
        assert_eq!(rate_limit_server_backoff(10), Duration::from_secs(15));
    }

    #[test]
    fn server_error_backoff_is_linear() {
        assert_eq!(server_error_backoff(0), Duration::from_secs(5));
        assert_eq!(server_error_backoff(1), Duration::from_secs(10));
        assert_eq!(server_error_backoff(4), Duration::from_secs(25));
    }

    #[test]
    fn network_error_backoff_differs_for_orders_vs_reads() {
        assert_eq!(network_error_backoff(0, false), Duration::from_secs(3));
        assert_eq!(network_error_backoff(0, true), Duration::from_secs(10));
        assert_eq!(network_error_backoff(2, true), Duration::from_secs(30));
    }

    #[test]
    fn extract_broker_code_reads_msg_cd() {
        assert_eq!(
            extract_broker_code("{\"msg_cd\":\"EGW00201\"}"),
            Some("EGW00201".to_string())
        );
        assert_eq!(extract_broker_code("not json"), None);
    }
}
