//! TOML credentials document and the store that re-reads it on demand.
//! Generalized from the teacher's per-broker `*Config::from_env()` split
//! (`config/broker_config.rs`) to a single declarative file covering both
//! of this broker's account types plus engine-wide parameters.

use crate::config::EngineConfig;
use crate::domain::account::{Account, AccountType};
use crate::domain::errors::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::error;

const DEFAULT_CONFIG_PATH: &str = "config/credentials.toml";
const CONFIG_PATH_ENV: &str = "KIS_CONFIG_PATH";

/// One account's entry in the credentials document. Fields are optional at
/// the parse layer so a document that only configures one account type
/// still parses; `CredentialsStore::get_fresh` turns an absent field for the
/// *requested* account type into [`ConfigError::MissingField`].
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AccountDocument {
    pub account_number: Option<String>,
    pub product_code: Option<String>,
    pub application_key: Option<String>,
    pub application_secret: Option<String>,
    pub account_password: Option<String>,
}

/// Optional passthrough block for the out-of-scope notification
/// collaborator. Opaque to the core engine -- never parsed beyond
/// capturing the raw table.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct NotificationDocument {
    #[serde(flatten)]
    pub raw: toml::Table,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsDocument {
    #[serde(default)]
    pub live: AccountDocument,
    #[serde(default)]
    pub paper: AccountDocument,
    pub live_rest_url: Option<String>,
    pub live_ws_url: Option<String>,
    pub paper_rest_url: Option<String>,
    pub paper_ws_url: Option<String>,
    #[serde(default)]
    pub engine: EngineConfig,
    pub notification: Option<NotificationDocument>,
}

/// Loads the one credentials document this engine runs against. Every call
/// to [`Self::get_fresh`] re-reads and re-parses the file from disk -- no
/// process-lifetime cache -- so an operator editing credentials mid-session
/// takes effect on the next token or config read.
pub struct CredentialsStore {
    path: PathBuf,
}

impl CredentialsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Resolves the document path from `KIS_CONFIG_PATH`, falling back to
    /// the default location.
    pub fn from_env() -> Self {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::new(path)
    }

    fn load_document(&self) -> Result<CredentialsDocument, ConfigError> {
        let text = std::fs::read_to_string(&self.path).map_err(|_| {
            error!(path = %self.path.display(), "credentials file not found");
            ConfigError::Missing {
                path: self.path.display().to_string(),
            }
        })?;
        toml::from_str(&text).map_err(|e| {
            error!(path = %self.path.display(), error = %e, "failed to parse credentials document");
            ConfigError::Parse(e)
        })
    }

    /// Re-reads the document and builds the [`Account`] for `account_type`,
    /// failing with [`ConfigError::MissingField`] for the first absent
    /// required field.
    pub fn get_fresh(&self, account_type: AccountType) -> Result<Account, ConfigError> {
        let doc = self.load_document()?;
        let (entry, rest_url, ws_url) = match account_type {
            AccountType::Live => (&doc.live, doc.live_rest_url, doc.live_ws_url),
            AccountType::Paper => (&doc.paper, doc.paper_rest_url, doc.paper_ws_url),
        };

        let field = |name: &str, value: Option<String>| -> Result<String, ConfigError> {
            value.ok_or_else(|| ConfigError::MissingField {
                account_type: account_type.as_str().to_string(),
                field: name.to_string(),
            })
        };

        Ok(Account {
            account_type,
            account_number: field("account_number", entry.account_number.clone())?,
            product_code: field("product_code", entry.product_code.clone())?,
            app_key: field("application_key", entry.application_key.clone())?,
            app_secret: field("application_secret", entry.application_secret.clone())?,
            account_password: entry.account_password.clone().unwrap_or_default(),
            rest_base_url: field("rest_url", rest_url)?,
            ws_url: field("ws_url", ws_url)?,
        })
    }

    /// Re-reads the document and returns the engine-wide parameters only,
    /// for callers that don't need a specific account's credentials.
    pub fn get_engine_config(&self) -> Result<EngineConfig, ConfigError> {
        Ok(self.load_document()?.engine)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("kis-trader-config-test-{}.toml", uuid::Uuid::new_v4()));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn missing_file_is_missing_error() {
        let store = CredentialsStore::new("/nonexistent/path/credentials.toml");
        match store.get_fresh(AccountType::Paper) {
            Err(ConfigError::Missing { .. }) => {}
            other => panic!("expected Missing, got {other:?}"),
        }
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let path = write_temp("this is not [ valid toml");
        let store = CredentialsStore::new(&path);
        match store.get_fresh(AccountType::Paper) {
            Err(ConfigError::Parse(_)) => {}
            other => panic!("expected Parse, got {other:?}"),
        }
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_field_for_active_account_type() {
        let path = write_temp(
            r#"
            paper_rest_url = "https://example.invalid"
            paper_ws_url = "ws://example.invalid"

            [paper]
            account_number = "12345678-01"
            product_code = "01"
            application_key = "key"
            # application_secret intentionally omitted
            "#,
        );
        let store = CredentialsStore::new(&path);
        match store.get_fresh(AccountType::Paper) {
            Err(ConfigError::MissingField { field, .. }) => assert_eq!(field, "application_secret"),
            other => panic!("expected MissingField, got {other:?}"),
        }
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn well_formed_document_round_trips() {
        let path = write_temp(
            r#"
            paper_rest_url = "https://openapivts.koreainvestment.com:29443"
            paper_ws_url = "ws://ops.koreainvestment.com:31000"

            [paper]
            account_number = "12345678-01"
            product_code = "01"
            application_key = "key"
            application_secret = "secret"
            account_password = "hunter2"

            [engine]
            max_positions = 3
            "#,
        );
        let store = CredentialsStore::new(&path);
        let account = store.get_fresh(AccountType::Paper).expect("should parse");
        assert_eq!(account.account_number, "12345678-01");
        assert_eq!(account.app_key, "key");

        let engine = store.get_engine_config().expect("should parse engine block");
        assert_eq!(engine.max_positions, 3);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn get_fresh_rereads_file_on_every_call() {
        let path = write_temp(
            r#"
            paper_rest_url = "https://a.invalid"
            paper_ws_url = "ws://a.invalid"
            [paper]
            account_number = "1"
            product_code = "01"
            application_key = "key-a"
            application_secret = "secret-a"
            "#,
        );
        let store = CredentialsStore::new(&path);
        let first = store.get_fresh(AccountType::Paper).unwrap();
        assert_eq!(first.app_key, "key-a");

        std::fs::write(
            &path,
            r#"
            paper_rest_url = "https://a.invalid"
            paper_ws_url = "ws://a.invalid"
            [paper]
            account_number = "1"
            product_code = "01"
            application_key = "key-b"
            application_secret = "secret-a"
            "#,
        )
        .unwrap();
        let second = store.get_fresh(AccountType::Paper).unwrap();
        assert_eq!(second.app_key, "key-b");
        let _ = std::fs::remove_file(&path);
    }
}
