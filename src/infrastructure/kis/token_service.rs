use crate::domain::account::{Account, AccountType};
use crate::domain::errors::TokenError;
use crate::domain::token::Token;
use crate::infrastructure::clock::Clock;
use crate::infrastructure::kis::wire::TokenResponse;
use chrono_tz::Asia::Seoul;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedToken {
    access_token: String,
    token_type: String,
    expires_in: i64,
    issued_at: chrono::DateTime<chrono::Utc>,
    expires_at: chrono::DateTime<chrono::Utc>,
}

impl From<&Token> for CachedToken {
    fn from(t: &Token) -> Self {
        Self {
            access_token: t.access_token.clone(),
            token_type: t.token_type.clone(),
            expires_in: (t.expires_at - t.issued_at).num_seconds(),
            issued_at: t.issued_at,
            expires_at: t.expires_at,
        }
    }
}

impl CachedToken {
    fn into_token(self, account_type: AccountType) -> Token {
        Token {
            account_type,
            access_token: self.access_token,
            token_type: self.token_type,
            issued_at: self.issued_at,
            expires_at: self.expires_at,
        }
    }
}

/// Status snapshot returned by [`TokenService::info`], for diagnostics.
#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub account_type: AccountType,
    pub has_token: bool,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

struct AccountState {
    token: Option<Token>,
    config_hash: Option<String>,
}

impl Default for AccountState {
    fn default() -> Self {
        Self {
            token: None,
            config_hash: None,
        }
    }
}

/// Mints, caches, refreshes, and invalidates per-account access
/// credentials. Every public method runs under a per-account mutex;
/// token issuance goes directly against the broker's `/oauth2/tokenP`
/// endpoint with a dedicated (unauthenticated) HTTP client rather than
/// through [`crate::infrastructure::kis::ApiClient`], which breaks what
/// would otherwise be a circular dependency (the API client needs a
/// token from this service for every other call).
pub struct TokenService {
    cache_dir: PathBuf,
    http: reqwest::Client,
    clock: Arc<dyn Clock>,
    state: Mutex<HashMap<AccountType, AccountState>>,
}

impl TokenService {
    pub fn new(cache_dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            clock,
            state: Mutex::new(HashMap::new()),
        }
    }

    fn today_tag(&self) -> String {
        self.clock.now().with_timezone(&Seoul).format("%Y%m%d").to_string()
    }

    fn token_file(&self, account_type: AccountType, day_tag: &str) -> PathBuf {
        self.cache_dir
            .join(format!("token_{}_{}.json", account_type.cache_tag(), day_tag))
    }

    fn connection_file(&self, account_type: AccountType) -> PathBuf {
        self.cache_dir
            .join(format!("connection_{}.json", account_type.cache_tag()))
    }

    /// Deletes any on-disk token file for `account_type` whose filename
    /// encodes a date other than today (KST).
    async fn purge_stale_files(&self, account_type: AccountType) {
        let today = self.today_tag();
        let prefix = format!("token_{}_", account_type.cache_tag());
        let mut entries = match tokio::fs::read_dir(&self.cache_dir).await {
            Ok(e) => e,
            Err(_) => return, // cache dir may not exist yet; nothing to purge
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(rest) = name.strip_prefix(&prefix) {
                let day = rest.trim_end_matches(".json");
                if day != today {
                    if tokio::fs::remove_file(entry.path()).await.is_ok() {
                        info!(file = %name, "purged stale token cache file");
                    }
                }
            }
        }
    }

    async fn load_connection_hash(&self, account_type: AccountType) -> Option<String> {
        let bytes = tokio::fs::read(self.connection_file(account_type)).await.ok()?;
        let value: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
        value.get("config_hash")?.as_str().map(str::to_string)
    }

    async fn save_connection_hash(&self, account_type: AccountType, hash: &str) {
        let path = self.connection_file(account_type);
        let doc = serde_json::json!({ "config_hash": hash });
        let _ = atomic_write(&path, &serde_json::to_vec_pretty(&doc).unwrap_or_default()).await;
    }

    async fn load_cached_token(&self, account_type: AccountType) -> Option<Token> {
        let today = self.today_tag();
        let path = self.token_file(account_type, &today);
        let bytes = tokio::fs::read(&path).await.ok()?;
        let cached: CachedToken = serde_json::from_slice(&bytes).ok()?;
        Some(cached.into_token(account_type))
    }

    async fn save_token(&self, token: &Token) {
        let today = self.today_tag();
        let path = self.token_file(token.account_type, &today);
        let cached = CachedToken::from(token);
        match serde_json::to_vec_pretty(&cached) {
            Ok(bytes) => {
                if let Err(e) = atomic_write(&path, &bytes).await {
                    warn!(error = %e, "failed to persist token cache");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize token cache"),
        }
    }

    async fn request_new_token(&self, account: &Account) -> Result<Token, TokenError> {
        let url = format!("{}/oauth2/tokenP", account.rest_base_url);
        let body = serde_json::json!({
            "grant_type": "client_credentials",
            "appkey": account.app_key,
            "appsecret": account.app_secret,
        });

        let response = self
            .http
            .post(&url)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| TokenError::Transient(format!("token request transport failure: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(TokenError::Fatal(format!(
                "token issuance HTTP {status}: {text}"
            )));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| TokenError::Fatal(format!("malformed token response: {e}")))?;

        Ok(Token::new(
            account.account_type,
            parsed.access_token,
            parsed.token_type,
            self.clock.now(),
            parsed.expires_in,
        ))
    }

    /// Guarantees a valid access token per account on demand, minimizing
    /// re-issuance. See spec algorithm in SPEC_FULL.md §4.B.
    pub async fn get_valid(&self, account: &Account) -> Result<Token, TokenError> {
        self.purge_stale_files(account.account_type).await;

        let mut guard = self.state.lock().await;
        let entry = guard.entry(account.account_type).or_default();

        let incoming_hash = account.config_hash();
        if entry.config_hash.as_deref() != Some(incoming_hash.as_str()) {
            let on_disk_hash = self.load_connection_hash(account.account_type).await;
            if on_disk_hash.as_deref() != Some(incoming_hash.as_str()) {
                if on_disk_hash.is_some() {
                    info!(account_type = %account.account_type, "credential change detected, invalidating cached token");
                }
                entry.token = None;
                let today = self.today_tag();
                let _ = tokio::fs::remove_file(self.token_file(account.account_type, &today)).await;
                self.save_connection_hash(account.account_type, &incoming_hash).await;
            }
            entry.config_hash = Some(incoming_hash);
        }

        let now = self.clock.now();

        if let Some(token) = &entry.token {
            if !token.issued_on_same_kst_day_as(now) || now >= token.expires_at || token.is_near_expiry(now) {
                debug!(account_type = %account.account_type, "in-memory token stale, discarding");
                entry.token = None;
            }
        }

        if entry.token.is_none() {
            if let Some(cached) = self.load_cached_token(account.account_type).await {
                if cached.issued_on_same_kst_day_as(now)
                    && now < cached.expires_at
                    && !cached.is_near_expiry(now)
                {
                    entry.token = Some(cached);
                }
            }
        }

        if entry.token.is_none() {
            info!(account_type = %account.account_type, "issuing new access token");
            let token = self.request_new_token(account).await?;
            self.save_token(&token).await;
            entry.token = Some(token);
        }

        Ok(entry.token.clone().expect("token set above"))
    }

    /// Forces re-issuance regardless of cache state.
    pub async fn force_refresh(&self, account: &Account) -> Result<Token, TokenError> {
        {
            let mut guard = self.state.lock().await;
            let entry = guard.entry(account.account_type).or_default();
            entry.token = None;
        }
        self.get_valid(account).await
    }

    pub async fn info(&self, account_type: AccountType) -> TokenInfo {
        let guard = self.state.lock().await;
        match guard.get(&account_type).and_then(|s| s.token.as_ref()) {
            Some(token) => TokenInfo {
                account_type,
                has_token: true,
                expires_at: Some(token.expires_at),
            },
            None => TokenInfo {
                account_type,
                has_token: false,
                expires_at: None,
            },
        }
    }
}

async fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp_path = path.with_extension("tmp");
    tokio::fs::write(&tmp_path, bytes).await?;
    tokio::fs::rename(&tmp_path, path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::ManualClock;
    use chrono::Utc;

    fn sample_account(rest_base_url: &str) -> Account {
        Account {
            account_type: AccountType::Paper,
            account_number: "1".into(),
            product_code: "01".into(),
            app_key: "key".into(),
            app_secret: "secret".into(),
            account_password: "".into(),
            rest_base_url: rest_base_url.to_string(),
            ws_url: "ws://example".into(),
        }
    }

    #[tokio::test]
    async fn today_tag_uses_kst_calendar() {
        let dir = tempdir();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let svc = TokenService::new(dir.clone(), clock);
        let tag = svc.today_tag();
        assert_eq!(tag.len(), 8);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn info_reports_no_token_before_any_issuance() {
        let dir = tempdir();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let svc = TokenService::new(dir.clone(), clock);
        let info = svc.info(AccountType::Paper).await;
        assert!(!info.has_token);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn cached_token_round_trips_through_disk() {
        let dir = tempdir();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let svc = TokenService::new(dir.clone(), clock.clone());
        let account = sample_account("https://example.invalid");
        let token = Token::new(
            AccountType::Paper,
            "abc123".into(),
            "Bearer".into(),
            clock.now(),
            86_400,
        );
        svc.save_token(&token).await;
        let loaded = svc.load_cached_token(AccountType::Paper).await;
        assert!(loaded.is_some());
        assert_eq!(loaded.unwrap().access_token, "abc123");
        let _ = std::fs::remove_dir_all(&dir);
    }

    fn tempdir() -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("kis-trader-token-test-{}", uuid::Uuid::new_v4()));
        path
    }
}
