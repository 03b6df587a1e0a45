//! A single intermediate key version and its persisted form.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::{Codec, MasterKey, SymmetricKey};
use crate::error::{KeeperError, Result};

/// An intermediate key that wraps one-time secret keys.
///
/// Immutable once created. Versions are never deleted, so every secret ever
/// written under one stays decryptable.
pub struct KeyVersion {
    key: SymmetricKey,
    activated_at: DateTime<Utc>,
}

/// Serialized body of a key version before it is sealed with the master key.
#[derive(Serialize)]
struct PersistedVersionRef<'a> {
    key: &'a str,
    activation: DateTime<Utc>,
}

#[derive(Deserialize)]
struct PersistedVersion {
    key: String,
    activation: DateTime<Utc>,
}

impl Drop for PersistedVersion {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl KeyVersion {
    pub(crate) fn new(key: SymmetricKey, activated_at: DateTime<Utc>) -> Self {
        Self { key, activated_at }
    }

    /// Instant from which this version wraps new secrets.
    pub fn activated_at(&self) -> DateTime<Utc> {
        self.activated_at
    }

    pub(crate) fn key(&self) -> &SymmetricKey {
        &self.key
    }

    /// Seal this version under the master key, producing the text stored by a
    /// `KeyVersionStore`.
    pub(crate) fn seal(&self, master: &MasterKey, codec: &dyn Codec) -> Result<String> {
        let key = Zeroizing::new(STANDARD.encode(self.key.as_bytes()));
        let body = Zeroizing::new(serde_json::to_vec(&PersistedVersionRef {
            key: &key,
            activation: self.activated_at,
        })?);
        codec.encrypt_text(&body, master.key())
    }

    /// Open a sealed version produced by [`KeyVersion::seal`].
    ///
    /// # Errors
    ///
    /// - `UnwrapAuthenticationFailed` if the entry does not authenticate under
    ///   `master` (wrong master key or tampered entry)
    /// - `Configuration` if it authenticates but the body is not a valid
    ///   key version
    pub(crate) fn open(wrapped: &str, master: &MasterKey, codec: &dyn Codec) -> Result<Self> {
        let body = codec
            .decrypt_text(wrapped, master.key())
            .map_err(|e| match e {
                KeeperError::AuthenticationFailed => KeeperError::UnwrapAuthenticationFailed,
                other => other,
            })?;

        let persisted: PersistedVersion = serde_json::from_slice(&body).map_err(|e| {
            KeeperError::Configuration(format!("Undecodable key version payload: {}", e))
        })?;
        let key_bytes = Zeroizing::new(STANDARD.decode(persisted.key.as_bytes()).map_err(
            |_| KeeperError::Configuration("Key version holds invalid base64".to_string()),
        )?);
        let key = SymmetricKey::from_slice(&key_bytes).map_err(|_| {
            KeeperError::Configuration("Key version holds a key of the wrong length".to_string())
        })?;

        Ok(Self::new(key, persisted.activation))
    }
}

impl std::fmt::Debug for KeyVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyVersion")
            .field("key", &"[REDACTED]")
            .field("activated_at", &self.activated_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::AesGcmCodec;
    use chrono::TimeZone;

    fn version() -> KeyVersion {
        KeyVersion::new(
            SymmetricKey::from_bytes([5u8; 32]),
            Utc.timestamp_opt(1_700_000_000, 987_654_321).unwrap(),
        )
    }

    #[test]
    fn test_seal_open_preserves_key_and_activation() {
        let codec = AesGcmCodec::new();
        let master = MasterKey::from_bytes([1u8; 32]);

        let sealed = version().seal(&master, &codec).unwrap();
        let opened = KeyVersion::open(&sealed, &master, &codec).unwrap();

        assert_eq!(opened.key().as_bytes(), &[5u8; 32]);
        assert_eq!(opened.activated_at(), version().activated_at());
    }

    #[test]
    fn test_sealed_body_is_json_with_key_and_activation() {
        let codec = AesGcmCodec::new();
        let master = MasterKey::from_bytes([1u8; 32]);

        let sealed = version().seal(&master, &codec).unwrap();
        let body = codec.decrypt_text(&sealed, master.key()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(value["key"], STANDARD.encode([5u8; 32]));
        assert_eq!(value["activation"], "2023-11-14T22:13:20.987654321Z");
    }

    #[test]
    fn test_open_with_wrong_master_is_unwrap_failure() {
        let codec = AesGcmCodec::new();
        let sealed = version()
            .seal(&MasterKey::from_bytes([1u8; 32]), &codec)
            .unwrap();

        let result = KeyVersion::open(&sealed, &MasterKey::from_bytes([2u8; 32]), &codec);
        assert!(matches!(result, Err(KeeperError::UnwrapAuthenticationFailed)));
    }

    #[test]
    fn test_open_rejects_authentic_garbage_as_configuration() {
        let codec = AesGcmCodec::new();
        let master = MasterKey::from_bytes([1u8; 32]);

        let not_json = codec.encrypt_text(b"not json", master.key()).unwrap();
        assert!(matches!(
            KeyVersion::open(&not_json, &master, &codec),
            Err(KeeperError::Configuration(_))
        ));

        let short_key = codec
            .encrypt_text(
                br#"{"key":"AAAA","activation":"2024-01-01T00:00:00Z"}"#,
                master.key(),
            )
            .unwrap();
        assert!(matches!(
            KeyVersion::open(&short_key, &master, &codec),
            Err(KeeperError::Configuration(_))
        ));
    }

    #[test]
    fn test_debug_redacts_key() {
        let debug = format!("{:?}", version());
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("5, 5"));
    }
}
