use serde::{Deserialize, Serialize};
use std::fmt;

/// The two broker environments this engine can drive. Exactly two values;
/// never generalized to a third because the broker itself only exposes two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountType {
    Live,
    Paper,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Live => "LIVE",
            AccountType::Paper => "PAPER",
        }
    }

    pub fn cache_tag(&self) -> &'static str {
        match self {
            AccountType::Live => "live",
            AccountType::Paper => "paper",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable identity and connection details for one broker account.
///
/// `app_secret` and `account_password` deliberately have no `Display`/`Debug`
/// leak path: the hand-rolled `Debug` impl below redacts both so a stray
/// `{:?}` in a log line never prints a credential.
#[derive(Clone, Serialize, Deserialize)]
pub struct Account {
    pub account_type: AccountType,
    pub account_number: String,
    pub product_code: String,
    pub app_key: String,
    pub app_secret: String,
    pub account_password: String,
    pub rest_base_url: String,
    pub ws_url: String,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("account_type", &self.account_type)
            .field("account_number", &self.account_number)
            .field("product_code", &self.product_code)
            .field("app_key", &"<redacted>")
            .field("app_secret", &"<redacted>")
            .field("account_password", &"<redacted>")
            .field("rest_base_url", &self.rest_base_url)
            .field("ws_url", &self.ws_url)
            .finish()
    }
}

impl Account {
    /// Hash of the fields that, if changed, must invalidate any cached token
    /// for this account. See [`crate::infrastructure::kis::token_service`].
    pub fn config_hash(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.app_key.as_bytes());
        hasher.update(b"|");
        hasher.update(self.app_secret.as_bytes());
        hasher.update(b"|");
        hasher.update(self.rest_base_url.as_bytes());
        hex::encode(hasher.finalize())
    }
}
