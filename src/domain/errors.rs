use thiserror::Error;

/// Configuration is absent, unparseable, or missing a field the active
/// account type requires. Fatal: aborts a session before any network
/// activity is attempted.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("credentials file not found at {path}")]
    Missing { path: String },

    #[error("failed to parse credentials document: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("missing required field `{field}` for account type {account_type}")]
    MissingField {
        account_type: String,
        field: String,
    },
}

/// Credential issuance/refresh failure. The `Fatal` variant aborts the
/// session; `Transient` is retried once at the call site.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("transient token failure: {0}")]
    Transient(String),

    #[error("fatal token failure: {0}")]
    Fatal(String),
}

/// HTTP 5xx surviving the final retry attempt. A read-only call leaves
/// account state unchanged; an order call is an *unknown outcome* and
/// forces an account snapshot refresh before the next decision for that
/// symbol.
#[derive(Debug, Error)]
#[error("server error after retries: {message} (broker_code={broker_code:?})")]
pub struct ServerError {
    pub message: String,
    pub broker_code: Option<String>,
}

/// Transport failure (timeout, connection reset) surviving the final
/// retry attempt. Same unknown-outcome semantics as [`ServerError`].
#[derive(Debug, Error)]
#[error("network error after retries: {0}")]
pub struct NetworkError(pub String);

/// HTTP 4xx other than 429. Never retried; the current cycle continues
/// with other candidates.
#[derive(Debug, Error)]
#[error("client error: HTTP {status} broker_code={broker_code:?} msg={message}")]
pub struct ClientError {
    pub status: u16,
    pub broker_code: Option<String>,
    pub message: String,
}

/// Strategy returned something malformed, or panicked/errored while
/// deciding. Always coerced to HOLD by the adapter; never propagated.
#[derive(Debug, Error)]
#[error("strategy error: {0}")]
pub struct StrategyError(pub String);

/// The top-level error type the trading cycle engine classifies broker
/// interactions into. Mirrors the broker-call state machine in
/// [`crate::infrastructure::kis::client`].
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Token(#[from] TokenError),
}

impl ApiError {
    /// Read-only calls leave state unchanged on Server/Network failure;
    /// only order placement needs the "unknown outcome" force-refresh.
    pub fn is_unknown_outcome(&self) -> bool {
        matches!(self, ApiError::Server(_) | ApiError::Network(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_error_message_contains_status() {
        let e = ClientError {
            status: 403,
            broker_code: Some("40310000".into()),
            message: "access denied".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("403"));
        assert!(msg.contains("40310000"));
    }

    #[test]
    fn server_and_network_errors_are_unknown_outcome() {
        assert!(ApiError::from(ServerError {
            message: "boom".into(),
            broker_code: None
        })
        .is_unknown_outcome());
        assert!(ApiError::from(NetworkError("timeout".into())).is_unknown_outcome());
    }

    #[test]
    fn client_error_is_not_unknown_outcome() {
        assert!(!ApiError::from(ClientError {
            status: 404,
            broker_code: None,
            message: "not found".into()
        })
        .is_unknown_outcome());
    }
}
