use crate::domain::account::AccountType;
use chrono::{DateTime, Utc};
use chrono_tz::Asia::Seoul;
use serde::{Deserialize, Serialize};

/// Minutes before `expires_at` at which a token is considered near-expiry
/// and eligible for proactive re-issuance.
pub const NEAR_EXPIRY_MINUTES: i64 = 30;

/// A broker access credential, scoped to one account.
///
/// Invariants (see spec): `expires_at > issued_at`; valid for use iff
/// `now < expires_at` AND `issued_at` falls on today's civil date in the
/// market's timezone (Asia/Seoul) -- a token survives only until the
/// calendar day rolls over, never past midnight even if `expires_at` is
/// still in the future.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub account_type: AccountType,
    pub access_token: String,
    pub token_type: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Token {
    pub fn new(
        account_type: AccountType,
        access_token: String,
        token_type: String,
        issued_at: DateTime<Utc>,
        expires_in_secs: i64,
    ) -> Self {
        let expires_at = issued_at + chrono::Duration::seconds(expires_in_secs);
        Self {
            account_type,
            access_token,
            token_type,
            issued_at,
            expires_at,
        }
    }

    /// A token is valid for use iff it has not expired and it was issued
    /// on the same KST calendar day as `now`.
    pub fn is_valid_for_use(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at && self.issued_on_same_kst_day_as(now)
    }

    pub fn issued_on_same_kst_day_as(&self, now: DateTime<Utc>) -> bool {
        self.issued_at.with_timezone(&Seoul).date_naive() == now.with_timezone(&Seoul).date_naive()
    }

    /// True once we are within `NEAR_EXPIRY_MINUTES` of `expires_at`.
    pub fn is_near_expiry(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at - chrono::Duration::minutes(NEAR_EXPIRY_MINUTES)
    }

    pub fn bearer_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn token_issued_at(issued_at: DateTime<Utc>, ttl_secs: i64) -> Token {
        Token::new(
            AccountType::Paper,
            "tok".into(),
            "Bearer".into(),
            issued_at,
            ttl_secs,
        )
    }

    #[test]
    fn valid_before_expiry_same_day() {
        let issued = Utc::now();
        let token = token_issued_at(issued, 86_400);
        assert!(token.is_valid_for_use(issued + Duration::minutes(1)));
    }

    #[test]
    fn invalid_after_expiry() {
        let issued = Utc::now();
        let token = token_issued_at(issued, 10);
        assert!(!token.is_valid_for_use(issued + Duration::seconds(11)));
    }

    #[test]
    fn invalid_after_midnight_kst_even_if_not_expired() {
        // Issue just before KST midnight, long TTL; check just after midnight.
        let issued = chrono_tz::Asia::Seoul
            .with_ymd_and_hms(2026, 7, 27, 23, 59, 0)
            .unwrap()
            .with_timezone(&Utc);
        let token = token_issued_at(issued, 86_400);
        let after_midnight = chrono_tz::Asia::Seoul
            .with_ymd_and_hms(2026, 7, 28, 0, 5, 0)
            .unwrap()
            .with_timezone(&Utc);
        assert!(!token.is_valid_for_use(after_midnight));
    }

    #[test]
    fn near_expiry_window() {
        let issued = Utc::now();
        let token = token_issued_at(issued, 3600); // 1h TTL
        assert!(!token.is_near_expiry(issued));
        assert!(token.is_near_expiry(issued + Duration::minutes(31)));
    }
}
