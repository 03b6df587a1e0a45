//! Core data types for the storage layer.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{KeeperError, Result};

/// Maximum length of a secret name in characters.
pub const MAX_NAME_LENGTH: usize = 64;

/// The kind of data a secret holds.
///
/// The integer codes are the persisted representation and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretKind {
    /// Login/password pair
    Login,
    /// Free-form text note
    Text,
    /// Arbitrary binary blob
    Binary,
    /// Bank card data
    Card,
}

impl SecretKind {
    /// Persisted integer code.
    pub fn code(self) -> i64 {
        match self {
            SecretKind::Login => 1,
            SecretKind::Text => 2,
            SecretKind::Binary => 3,
            SecretKind::Card => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SecretKind::Login => "login",
            SecretKind::Text => "text",
            SecretKind::Binary => "binary",
            SecretKind::Card => "card",
        }
    }
}

impl TryFrom<i64> for SecretKind {
    type Error = KeeperError;

    fn try_from(code: i64) -> Result<Self> {
        match code {
            1 => Ok(SecretKind::Login),
            2 => Ok(SecretKind::Text),
            3 => Ok(SecretKind::Binary),
            4 => Ok(SecretKind::Card),
            other => Err(KeeperError::Storage(format!(
                "Unknown secret kind code: {}",
                other
            ))),
        }
    }
}

impl FromStr for SecretKind {
    type Err = KeeperError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "login" => Ok(SecretKind::Login),
            "text" => Ok(SecretKind::Text),
            "binary" => Ok(SecretKind::Binary),
            "card" => Ok(SecretKind::Card),
            other => Err(KeeperError::InvalidInput(format!(
                "Unknown secret kind '{}' (expected login, text, binary or card)",
                other
            ))),
        }
    }
}

impl fmt::Display for SecretKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A secret as persisted: everything needed to decrypt it except keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRecord {
    /// Owning user ID
    pub owner: i64,

    /// Secret name, unique per owner
    pub name: String,

    /// Upload timestamp; selects the key version on read. Never mutated.
    pub uploaded_at: DateTime<Utc>,

    /// Kind of data
    pub kind: SecretKind,

    /// One-time secret key, sealed under the key version active at `uploaded_at`
    pub wrapped_key: String,

    /// Secret data sealed under the one-time key
    pub ciphertext: Vec<u8>,
}

/// Builder for writing a new secret.
pub struct NewSecret {
    /// Owning user ID
    pub owner: i64,

    /// Secret name
    pub name: String,

    /// Kind of data
    pub kind: SecretKind,

    /// Plaintext payload (zeroized on drop)
    pub data: Zeroizing<Vec<u8>>,
}

impl NewSecret {
    pub fn new(
        owner: i64,
        name: impl Into<String>,
        kind: SecretKind,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            owner,
            name: name.into(),
            kind,
            data: Zeroizing::new(data.into()),
        }
    }
}

impl fmt::Debug for NewSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewSecret")
            .field("owner", &self.owner)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("data", &"[REDACTED]")
            .finish()
    }
}

/// A decrypted secret returned by a read.
pub struct Secret {
    pub owner: i64,
    pub name: String,
    pub kind: SecretKind,
    pub uploaded_at: DateTime<Utc>,
    pub data: Zeroizing<Vec<u8>>,
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("owner", &self.owner)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("uploaded_at", &self.uploaded_at)
            .field("data", &"[REDACTED]")
            .finish()
    }
}

/// Validate a secret name.
pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(KeeperError::InvalidInput(
            "Secret name cannot be empty".to_string(),
        ));
    }

    let length = name.chars().count();
    if length > MAX_NAME_LENGTH {
        return Err(KeeperError::InvalidInput(format!(
            "Secret name must be at most {} characters (got {})",
            MAX_NAME_LENGTH, length
        )));
    }

    Ok(())
}
