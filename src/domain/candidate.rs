use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A symbol produced by the candidate provider for evaluation this cycle.
/// Lifetime is a single cycle -- never persisted or carried forward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateStock {
    pub symbol: String,
    pub display_name: String,
    pub last_price: Decimal,
    pub intraday_change_rate: Decimal,
    pub volume: u64,
    pub volume_ratio_vs_prev_day: Decimal,
    pub provider_score: Decimal,
}

impl CandidateStock {
    /// The default composite score: `change_rate + volume_ratio`. Scoring
    /// itself is pluggable (see
    /// [`crate::application::candidate_provider::CandidateScorer`]) -- this
    /// is one implementation of that trait, not a stable contract.
    pub fn default_score(&self) -> Decimal {
        self.intraday_change_rate + self.volume_ratio_vs_prev_day
    }
}
