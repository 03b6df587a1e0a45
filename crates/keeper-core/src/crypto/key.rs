//! Symmetric key material.
//!
//! Every key in the hierarchy (master key, intermediate key versions and
//! one-time secret keys) is a 256-bit [`SymmetricKey`]. Key bytes are
//! zeroized when dropped and never appear in `Debug` output.

use argon2::Argon2;
use zeroize::{ZeroizeOnDrop, Zeroizing};

use crate::error::{KeeperError, Result};

/// Length of every symmetric key in bytes (256 bits for AES-256-GCM).
pub const KEY_LENGTH: usize = 32;

/// Argon2id parameters for passphrase-derived master keys.
///
/// - Memory: 64 MB (64 * 1024 KB)
/// - Iterations: 3
/// - Parallelism: 1
const ARGON2_MEMORY_KB: u32 = 64 * 1024;
const ARGON2_ITERATIONS: u32 = 3;
const ARGON2_PARALLELISM: u32 = 1;

/// Minimum salt length accepted for passphrase derivation.
pub const MIN_SALT_LENGTH: usize = 16;

/// A 256-bit symmetric key (zeroized on drop).
#[derive(Clone, ZeroizeOnDrop)]
pub struct SymmetricKey {
    key: [u8; KEY_LENGTH],
}

impl SymmetricKey {
    /// Generate a key from the operating system CSPRNG.
    pub fn generate() -> Result<Self> {
        let mut key = [0u8; KEY_LENGTH];
        getrandom::getrandom(&mut key)
            .map_err(|e| KeeperError::Crypto(format!("Failed to generate key bytes: {}", e)))?;
        Ok(Self { key })
    }

    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self { key: bytes }
    }

    /// Build a key from a slice that must be exactly [`KEY_LENGTH`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LENGTH] = bytes.try_into().map_err(|_| {
            KeeperError::InvalidInput(format!(
                "Key must be {} bytes (got {})",
                KEY_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(Self { key })
    }

    /// Get a reference to the raw key bytes.
    ///
    /// # Security
    ///
    /// Avoid storing or logging this value. Use only for immediate encryption operations.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// The root secret that wraps intermediate key versions.
///
/// Supplied once at process start and never persisted by the core. It is
/// deliberately not `Clone`: a single owner holds it for the process lifetime.
pub struct MasterKey {
    key: SymmetricKey,
}

impl MasterKey {
    /// Generate a fresh master key (for `keygen`-style tooling and tests).
    pub fn generate() -> Result<Self> {
        Ok(Self {
            key: SymmetricKey::generate()?,
        })
    }

    /// Wrap raw master key bytes.
    pub fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self {
            key: SymmetricKey::from_bytes(bytes),
        }
    }

    /// Parse a master key from its hex form (64 hex characters).
    ///
    /// Surrounding whitespace is ignored so keyfiles with a trailing newline
    /// are accepted.
    ///
    /// # Errors
    ///
    /// Returns `KeeperError::Configuration` if the value is empty, not hex,
    /// or not exactly 32 bytes long.
    pub fn from_hex(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Err(KeeperError::Configuration(
                "Master key is empty".to_string(),
            ));
        }

        let bytes = Zeroizing::new(hex::decode(value).map_err(|_| {
            KeeperError::Configuration("Master key is not valid hex".to_string())
        })?);
        if bytes.len() != KEY_LENGTH {
            return Err(KeeperError::Configuration(format!(
                "Master key must be {} hex characters (got {})",
                KEY_LENGTH * 2,
                value.len()
            )));
        }

        Ok(Self {
            key: SymmetricKey::from_slice(&bytes)?,
        })
    }

    /// Derive a master key from a passphrase using Argon2id.
    ///
    /// Same passphrase + salt always produces the same key, so the salt must
    /// be kept alongside the server configuration.
    pub fn derive(passphrase: &str, salt: &[u8]) -> Result<Self> {
        if passphrase.is_empty() {
            return Err(KeeperError::Configuration(
                "Passphrase cannot be empty".to_string(),
            ));
        }

        if salt.len() < MIN_SALT_LENGTH {
            return Err(KeeperError::Configuration(format!(
                "Salt must be at least {} bytes",
                MIN_SALT_LENGTH
            )));
        }

        let params = argon2::Params::new(
            ARGON2_MEMORY_KB,
            ARGON2_ITERATIONS,
            ARGON2_PARALLELISM,
            Some(KEY_LENGTH),
        )
        .map_err(|e| KeeperError::Crypto(format!("Failed to create Argon2 params: {}", e)))?;

        let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

        let mut key_bytes = Zeroizing::new([0u8; KEY_LENGTH]);
        argon2
            .hash_password_into(passphrase.as_bytes(), salt, &mut key_bytes[..])
            .map_err(|e| KeeperError::Crypto(format!("Key derivation failed: {}", e)))?;

        Ok(Self::from_bytes(*key_bytes))
    }

    /// Hex form of the key, for writing a keyfile once at generation time.
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.key.as_bytes()))
    }

    pub(crate) fn key(&self) -> &SymmetricKey {
        &self.key
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_keys_differ() {
        let key1 = SymmetricKey::generate().unwrap();
        let key2 = SymmetricKey::generate().unwrap();
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_from_slice_rejects_wrong_length() {
        assert!(SymmetricKey::from_slice(&[0u8; 16]).is_err());
        assert!(SymmetricKey::from_slice(&[0u8; KEY_LENGTH]).is_ok());
    }

    #[test]
    fn test_symmetric_key_debug_redacts() {
        let key = SymmetricKey::from_bytes([0xAB; KEY_LENGTH]);
        let debug_output = format!("{:?}", key);
        assert!(debug_output.contains("REDACTED"));
        assert!(!debug_output.contains(&hex::encode(&key.as_bytes()[..4])));
    }

    #[test]
    fn test_master_key_from_hex() {
        let encoded = "cb459063d4bbbd4ce04a7c5b6e8121e7933630bada8fcb3abc20f6ca0aba3793";
        let key = MasterKey::from_hex(encoded).unwrap();
        assert_eq!(key.to_hex().as_str(), encoded);
    }

    #[test]
    fn test_master_key_from_hex_trims_whitespace() {
        let encoded = format!("  {}\n", "11".repeat(KEY_LENGTH));
        assert!(MasterKey::from_hex(&encoded).is_ok());
    }

    #[test]
    fn test_master_key_rejects_malformed_hex() {
        let result = MasterKey::from_hex("not-hex-at-all");
        assert!(matches!(result, Err(KeeperError::Configuration(_))));

        let result = MasterKey::from_hex("abcd");
        assert!(matches!(result, Err(KeeperError::Configuration(_))));

        let result = MasterKey::from_hex("   ");
        assert!(matches!(result, Err(KeeperError::Configuration(_))));
    }

    #[test]
    fn test_master_key_debug_redacts() {
        let key = MasterKey::from_bytes([0x5A; KEY_LENGTH]);
        let debug_output = format!("{:?}", key);
        assert!(debug_output.contains("REDACTED"));
        assert!(!debug_output.contains("5a5a5a5a"));
    }

    #[test]
    fn test_derive_deterministic() {
        let salt = b"keeper-salt-0123456789";
        let key1 = MasterKey::derive("server-passphrase", salt).unwrap();
        let key2 = MasterKey::derive("server-passphrase", salt).unwrap();
        assert_eq!(key1.key().as_bytes(), key2.key().as_bytes());
    }

    #[test]
    fn test_derive_different_salt_different_key() {
        let key1 = MasterKey::derive("server-passphrase", b"salt-one-1234567890").unwrap();
        let key2 = MasterKey::derive("server-passphrase", b"salt-two-1234567890").unwrap();
        assert_ne!(key1.key().as_bytes(), key2.key().as_bytes());
    }

    #[test]
    fn test_derive_rejects_short_salt_and_empty_passphrase() {
        let result = MasterKey::derive("server-passphrase", b"short");
        assert!(matches!(result, Err(KeeperError::Configuration(_))));

        let result = MasterKey::derive("", b"keeper-salt-0123456789");
        assert!(matches!(result, Err(KeeperError::Configuration(_))));
    }
}
