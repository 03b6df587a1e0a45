//! Error types for Keeper core operations.
//!
//! This module defines the error hierarchy for all core operations.
//! Per-secret failures (`VersionNotFound`, `UnwrapAuthenticationFailed`,
//! `DataAuthenticationFailed`) are distinct variants so the service layer can
//! report them without inspecting messages; the binary maps everything else
//! to user-facing text.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type alias for Keeper operations.
pub type Result<T> = std::result::Result<T, KeeperError>;

/// Core error type for Keeper operations.
#[derive(Debug, Error)]
pub enum KeeperError {
    /// Missing or malformed master key, or an inconsistent key ledger
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The ledger holds no key version and none could be created
    #[error("No active key version")]
    NoActiveKey,

    /// A key version or a secret key failed to authenticate while unwrapping
    #[error("Key unwrap failed authentication (tampered data or wrong key)")]
    UnwrapAuthenticationFailed,

    /// No retained key version was active at the record's upload time
    #[error("No key version was active at {at}")]
    VersionNotFound { at: DateTime<Utc> },

    /// Secret ciphertext failed to authenticate
    #[error("Secret data failed authentication (tampered or corrupted)")]
    DataAuthenticationFailed,

    /// Raw codec result: tag mismatch or malformed ciphertext
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// Cipher setup or randomness failure
    #[error("Encryption error: {0}")]
    Crypto(String),

    /// Storage backend error (generic)
    #[error("Storage error: {0}")]
    Storage(String),

    /// SQLite-specific storage error
    #[error("SQLite error: {source}")]
    Sqlite {
        #[from]
        source: rusqlite::Error,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    /// I/O error
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Invalid user input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl KeeperError {
    /// Whether this error means stored data could not be authenticated.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            KeeperError::AuthenticationFailed
                | KeeperError::UnwrapAuthenticationFailed
                | KeeperError::DataAuthenticationFailed
        )
    }
}
