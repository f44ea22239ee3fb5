use crate::domain::account::AccountType;

/// The broker operations this engine needs a TR-ID for. Reference data
/// reads carry the same code on both LIVE and PAPER; account/trading
/// operations differ per account type, which is why every lookup is
/// keyed by `(Operation, AccountType)` rather than `Operation` alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Quote,
    DailyCandles,
    MinuteCandles,
    TopGainersRanking,
    AccountBalance,
    BuyOrder,
    SellOrder,
}

/// Returns the broker's `tr_id` header value for `(operation, account_type)`.
///
/// This table is the one place that knows the LIVE/PAPER TR-ID split; the
/// API client never branches on account type itself, it only consults
/// this lookup.
pub fn tr_id(operation: Operation, account_type: AccountType) -> &'static str {
    use AccountType::{Live, Paper};
    use Operation::*;

    match (operation, account_type) {
        // Reference data is identical across LIVE/PAPER.
        (Quote, _) => "FHKST01010100",
        (DailyCandles, _) => "FHKST03010100",
        (MinuteCandles, _) => "FHKST03010200",
        // The broker's PAPER environment has no top-gainers feed; callers
        // route this operation to the LIVE endpoint regardless of the
        // active account (see CandidateProvider), so only one code exists.
        (TopGainersRanking, _) => "FHPST01700000",

        (AccountBalance, Live) => "TTTC8434R",
        (AccountBalance, Paper) => "VTTC8434R",

        (BuyOrder, Live) => "TTTC0802U",
        (BuyOrder, Paper) => "VTTC0802U",

        (SellOrder, Live) => "TTTC0801U",
        (SellOrder, Paper) => "VTTC0801U",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buy_and_sell_differ_by_account_type() {
        assert_ne!(
            tr_id(Operation::BuyOrder, AccountType::Live),
            tr_id(Operation::BuyOrder, AccountType::Paper)
        );
    }

    #[test]
    fn reference_data_is_shared_across_account_types() {
        assert_eq!(
            tr_id(Operation::Quote, AccountType::Live),
            tr_id(Operation::Quote, AccountType::Paper)
        );
    }
}
