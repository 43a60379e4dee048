//! Error types for calsync-core.
//!
//! One enum per subsystem, aggregated into [`CoreError`] via `#[from]`.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the library.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("oauth error: {0}")]
    OAuth(#[from] OAuthError),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("ical error: {0}")]
    Ical(#[from] IcalError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistence errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("query failed: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("database migration failed: {0}")]
    MigrationFailed(String),
}

impl StoreError {
    pub(crate) fn not_found(kind: &'static str, id: &str) -> Self {
        StoreError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    #[error("failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    #[error("data directory unavailable: {0}")]
    DataDir(String),

    #[error("missing OAuth client credentials for {0}")]
    MissingOAuthCredentials(&'static str),
}

/// OAuth token lifecycle errors.
#[derive(Error, Debug)]
pub enum OAuthError {
    #[error("authorization failed: {0}")]
    AuthorizationFailed(String),

    #[error("token exchange failed: {0}")]
    TokenExchangeFailed(String),

    #[error("token refresh failed: {0}")]
    TokenRefreshFailed(String),

    #[error("no refresh token available - re-authentication required")]
    NoRefreshToken,

    #[error("no callback received within {timeout_secs} seconds")]
    CallbackTimeout { timeout_secs: u64 },

    #[error("callback listener error: {0}")]
    Listener(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from remote calendar providers.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("{operation} failed with status {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("malformed response: {0}")]
    BadResponse(String),

    #[error("oauth error: {0}")]
    OAuth(#[from] OAuthError),
}

/// iCalendar decode errors.
#[derive(Error, Debug)]
pub enum IcalError {
    #[error("no VEVENT component found")]
    NoVEvent,
}
