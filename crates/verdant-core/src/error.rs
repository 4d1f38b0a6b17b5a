//! Core error types for verdant-core.
//!
//! This module defines the error hierarchy using thiserror. Most engine
//! paths recover locally (defaults, heuristic fallbacks); only storage and
//! configuration failures surface to callers.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for verdant-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Shared state store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// External scoring/classification errors
    #[error("Scoring error: {0}")]
    Scoring(#[from] ScoringError),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Shared state store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// Document could not be encoded or merged
    #[error("Failed to encode document '{key}': {source}")]
    Codec {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Optimistic update kept losing the race
    #[error("Concurrent update conflict on '{key}' after {attempts} attempts")]
    Conflict { key: String, attempts: u32 },

    /// Backend mutex was poisoned by a panicking writer
    #[error("Store backend poisoned")]
    Poisoned,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Errors from the external analyzer/classifier. These never leave the
/// scoring boundary: callers log them and fall back to the heuristic.
#[derive(Error, Debug)]
pub enum ScoringError {
    /// No API key configured for the selected provider
    #[error("No API key configured for provider '{provider}'")]
    MissingCredential { provider: String },

    /// Transport-level failure (connect, timeout, TLS)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("External service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Response did not match the expected shape
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(inner, _msg) => {
                if inner.code == rusqlite::ErrorCode::DatabaseLocked
                    || inner.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    StoreError::Locked
                } else {
                    StoreError::QueryFailed(err.to_string())
                }
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Store(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layered_errors_convert_into_core_error() {
        let err: CoreError = StoreError::Conflict {
            key: "forestState".into(),
            attempts: 16,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Store error: Concurrent update conflict on 'forestState' after 16 attempts"
        );

        let err: CoreError = ConfigError::UnknownKey("timers.nope".into()).into();
        assert!(matches!(err, CoreError::Config(ConfigError::UnknownKey(_))));

        let err: CoreError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, CoreError::Store(StoreError::QueryFailed(_))));
    }
}
