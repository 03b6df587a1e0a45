//! Envelope encryption of secret payloads.
//!
//! Every secret gets its own one-time key. The payload is sealed under that
//! key, and the key itself is sealed under the ledger's active version. Only
//! the two sealed values and the upload timestamp are stored; the one-time
//! key exists in memory for the length of a single call.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use zeroize::Zeroizing;

use crate::crypto::{Codec, SymmetricKey};
use crate::error::{KeeperError, Result};
use crate::ledger::KeyLedger;

/// Output of [`EnvelopeManager::wrap`].
#[derive(Debug, Clone)]
pub struct Sealed {
    /// Payload sealed under the one-time key.
    pub ciphertext: Vec<u8>,
    /// One-time key sealed under the active key version (base64 text).
    pub wrapped_key: String,
    /// Upload timestamp to persist with the record.
    pub sealed_at: DateTime<Utc>,
}

/// Seals and opens secret payloads against a key ledger.
#[derive(Clone)]
pub struct EnvelopeManager {
    codec: Arc<dyn Codec>,
    ledger: Arc<dyn KeyLedger>,
}

impl EnvelopeManager {
    pub fn new(codec: Arc<dyn Codec>, ledger: Arc<dyn KeyLedger>) -> Self {
        Self { codec, ledger }
    }

    /// Seal `plaintext` under a fresh one-time key wrapped by the active
    /// version.
    ///
    /// The returned `sealed_at` must be stored as the record's upload
    /// timestamp; `unwrap` uses it to find the wrapping version again.
    ///
    /// # Errors
    ///
    /// Returns `KeeperError::NoActiveKey` if the ledger is empty.
    pub fn wrap(&self, plaintext: &[u8]) -> Result<Sealed> {
        let point = self.ledger.seal_point()?;

        let secret_key = self.codec.generate_key()?;
        let ciphertext = self.codec.encrypt(plaintext, &secret_key)?;
        let wrapped_key = self
            .codec
            .encrypt_text(secret_key.as_bytes(), point.version.key())?;

        Ok(Sealed {
            ciphertext,
            wrapped_key,
            sealed_at: point.at,
        })
    }

    /// Open a record sealed by [`EnvelopeManager::wrap`].
    ///
    /// # Errors
    ///
    /// - `VersionNotFound` if no version was active at `uploaded_at`
    /// - `UnwrapAuthenticationFailed` if the wrapped key does not open under
    ///   that version
    /// - `DataAuthenticationFailed` if the ciphertext does not open under the
    ///   recovered key
    pub fn unwrap(
        &self,
        ciphertext: &[u8],
        wrapped_key: &str,
        uploaded_at: DateTime<Utc>,
    ) -> Result<Zeroizing<Vec<u8>>> {
        let version = self.ledger.version_for(uploaded_at)?;

        let key_bytes = self
            .codec
            .decrypt_text(wrapped_key, version.key())
            .map_err(|e| match e {
                KeeperError::AuthenticationFailed => KeeperError::UnwrapAuthenticationFailed,
                other => other,
            })?;
        let secret_key = SymmetricKey::from_slice(&key_bytes)
            .map_err(|_| KeeperError::UnwrapAuthenticationFailed)?;

        self.codec
            .decrypt(ciphertext, &secret_key)
            .map_err(|e| match e {
                KeeperError::AuthenticationFailed => KeeperError::DataAuthenticationFailed,
                other => other,
            })
    }
}
