//! Surfaces a ranked list of tradable candidates for one cycle.
//!
//! Fetches top movers, filters out symbols already held, and dedupes, as a
//! synchronous, pull-based `select_candidates` call rather than a
//! background loop pushing over a channel -- the trading cycle engine
//! calls it once per cycle instead of subscribing to a stream of updates.

use crate::domain::candidate::CandidateStock;
use crate::domain::errors::ApiError;
use crate::domain::ports::MarketReadPort;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, warn};

fn parse_decimal(raw: &str) -> Decimal {
    Decimal::from_str(raw.trim()).unwrap_or(Decimal::ZERO)
}

fn parse_u64(raw: &str) -> u64 {
    raw.trim().parse().unwrap_or(0)
}

/// Scoring is pluggable: the engine only depends on this trait, not on any
/// one formula.
pub trait CandidateScorer: Send + Sync {
    fn score(&self, candidate: &CandidateStock) -> Decimal;
}

/// The default composite: `change_rate + volume_ratio`, matching
/// [`CandidateStock::default_score`].
pub struct CompositeScorer;

impl CandidateScorer for CompositeScorer {
    fn score(&self, candidate: &CandidateStock) -> Decimal {
        candidate.default_score()
    }
}

#[derive(Debug, Clone)]
pub struct CandidateProviderConfig {
    pub max_candidates: usize,
    pub price_floor: Decimal,
    pub price_ceiling: Decimal,
    pub change_rate_floor: Decimal,
    pub volume_ratio_floor: Decimal,
}

impl Default for CandidateProviderConfig {
    fn default() -> Self {
        Self {
            max_candidates: 10,
            price_floor: Decimal::from(1_000),
            price_ceiling: Decimal::from(200_000),
            change_rate_floor: Decimal::from(2),
            volume_ratio_floor: Decimal::from(150),
        }
    }
}

/// Selects candidates for one cycle. `ranking_source` is the client the
/// top-gainers ranking is actually fetched through: on a LIVE account it is
/// the same client as `market`; on a PAPER account (where the ranking feed
/// doesn't exist) it is a second, LIVE-bound read-only client constructed
/// once at session bootstrap, so the borrow never needs mutable override
/// state on the client itself -- only its own read surface is exposed here.
pub struct CandidateProvider {
    market: Arc<dyn MarketReadPort>,
    ranking_source: Arc<dyn MarketReadPort>,
    config: CandidateProviderConfig,
    scorer: Arc<dyn CandidateScorer>,
}

impl CandidateProvider {
    pub fn new(
        market: Arc<dyn MarketReadPort>,
        ranking_source: Arc<dyn MarketReadPort>,
        config: CandidateProviderConfig,
    ) -> Self {
        Self {
            market,
            ranking_source,
            config,
            scorer: Arc::new(CompositeScorer),
        }
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn CandidateScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    /// Returns up to `max_candidates` candidates, descending by score,
    /// excluding anything already held. On terminal ranking failure returns
    /// `Err` -- the caller (trading cycle engine) surfaces this as a
    /// `server_unresponsive` condition and ends the session, per spec; an
    /// empty `Ok` list (ranking succeeded, nothing passed the filters) is a
    /// completely ordinary cycle outcome and never ends the session.
    pub async fn select_candidates(&self, current_holdings: &[String]) -> Result<Vec<CandidateStock>, ApiError> {
        let rows = match self.ranking_source.get_top_gainers().await {
            Ok(rows) => rows,
            Err(e) => {
                error!(error = %e, "top gainers ranking unavailable");
                return Err(e);
            }
        };

        let mut candidates: Vec<CandidateStock> = rows
            .into_iter()
            .filter(|r| !current_holdings.contains(&r.mksc_shrn_iscd))
            .map(|r| {
                let last_price = parse_decimal(&r.stck_prpr);
                CandidateStock {
                    symbol: r.mksc_shrn_iscd,
                    display_name: r.hts_kor_isnm,
                    last_price,
                    intraday_change_rate: parse_decimal(&r.prdy_ctrt),
                    volume: parse_u64(&r.acml_vol),
                    volume_ratio_vs_prev_day: parse_decimal(&r.vol_inrt),
                    provider_score: Decimal::ZERO,
                }
            })
            .filter(|c| c.last_price >= self.config.price_floor && c.last_price <= self.config.price_ceiling)
            .filter(|c| c.intraday_change_rate >= self.config.change_rate_floor)
            .filter(|c| c.volume_ratio_vs_prev_day >= self.config.volume_ratio_floor)
            .collect();

        for c in &mut candidates {
            c.provider_score = self.scorer.score(c);
        }
        candidates.sort_by(|a, b| b.provider_score.cmp(&a.provider_score));
        candidates.truncate(self.config.max_candidates);

        if candidates.is_empty() {
            warn!("candidate provider found no candidates passing filters this cycle");
        }

        Ok(candidates)
    }

    /// Exposed so the trading cycle engine can fetch a quote for a
    /// candidate or held symbol through the same read port this provider
    /// uses, without depending on the full client.
    pub fn market(&self) -> &Arc<dyn MarketReadPort> {
        &self.market
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::kis::wire::{BalanceOutput1, BalanceOutput2, CandleRow, QuoteOutput, RankingRow};
    use async_trait::async_trait;

    struct FakeRanking {
        rows: Vec<RankingRow>,
        fail: bool,
    }

    #[async_trait]
    impl MarketReadPort for FakeRanking {
        async fn get_quote(&self, _symbol: &str) -> Result<QuoteOutput, ApiError> {
            unimplemented!()
        }
        async fn get_daily_candles(&self, _symbol: &str) -> Result<Vec<CandleRow>, ApiError> {
            unimplemented!()
        }
        async fn get_minute_candles(&self, _symbol: &str) -> Result<Vec<CandleRow>, ApiError> {
            unimplemented!()
        }
        async fn get_top_gainers(&self) -> Result<Vec<RankingRow>, ApiError> {
            if self.fail {
                return Err(ApiError::Network(crate::domain::errors::NetworkError("down".into())));
            }
            Ok(self.rows.clone())
        }
        async fn get_account_balance(&self) -> Result<(Vec<BalanceOutput1>, BalanceOutput2), ApiError> {
            unimplemented!()
        }
    }

    fn row(symbol: &str, price: &str, change: &str, vol_ratio: &str) -> RankingRow {
        RankingRow {
            mksc_shrn_iscd: symbol.into(),
            hts_kor_isnm: format!("{symbol} corp"),
            stck_prpr: price.into(),
            prdy_ctrt: change.into(),
            acml_vol: "1000".into(),
            vol_inrt: vol_ratio.into(),
        }
    }

    #[tokio::test]
    async fn filters_out_held_symbols_and_low_movers() {
        let ranking = Arc::new(FakeRanking {
            rows: vec![
                row("005930", "60000", "3.0", "200"),
                row("000660", "50000", "0.5", "300"), // below change rate floor
                row("035420", "70000", "4.0", "180"),
            ],
            fail: false,
        });
        let provider = CandidateProvider::new(ranking.clone(), ranking, CandidateProviderConfig::default());
        let candidates = provider.select_candidates(&["035420".to_string()]).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].symbol, "005930");
    }

    #[tokio::test]
    async fn ranking_failure_propagates_as_err() {
        let ranking = Arc::new(FakeRanking {
            rows: vec![],
            fail: true,
        });
        let provider = CandidateProvider::new(ranking.clone(), ranking, CandidateProviderConfig::default());
        let result = provider.select_candidates(&[]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn sorted_descending_by_score() {
        let ranking = Arc::new(FakeRanking {
            rows: vec![
                row("005930", "60000", "3.0", "200"),
                row("035420", "70000", "10.0", "300"),
            ],
            fail: false,
        });
        let provider = CandidateProvider::new(ranking.clone(), ranking, CandidateProviderConfig::default());
        let candidates = provider.select_candidates(&[]).await.unwrap();
        assert_eq!(candidates[0].symbol, "035420");
    }
}
