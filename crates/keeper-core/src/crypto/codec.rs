//! Authenticated encryption codec.
//!
//! [`AesGcmCodec`] seals data with AES-256-GCM. Every call to `encrypt` draws
//! a fresh 96-bit nonce from the OS CSPRNG and packs it in front of the
//! ciphertext, so a sealed value is self-contained:
//!
//! ```text
//! | nonce (12 bytes) | ciphertext (len(plaintext) bytes) | tag (16 bytes) |
//! ```
//!
//! Text-oriented collaborators (the key-version store, the wrapped secret key
//! column) get the same bytes as standard base64 through the `*_text` methods.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use zeroize::Zeroizing;

use crate::crypto::key::SymmetricKey;
use crate::error::{KeeperError, Result};

/// Nonce length for AES-GCM (96 bits).
pub const NONCE_LENGTH: usize = 12;

/// Authentication tag length for AES-GCM.
pub const TAG_LENGTH: usize = 16;

/// Authenticated symmetric encryption.
///
/// Implementations must never reuse a nonce under one key and must never
/// return plaintext for input that fails authentication.
pub trait Codec: Send + Sync {
    /// Generate a fresh random key suitable for this codec.
    fn generate_key(&self) -> Result<SymmetricKey>;

    /// Encrypt `plaintext` under `key`, returning the packed sealed bytes.
    fn encrypt(&self, plaintext: &[u8], key: &SymmetricKey) -> Result<Vec<u8>>;

    /// Decrypt packed sealed bytes.
    ///
    /// # Errors
    ///
    /// Returns `KeeperError::AuthenticationFailed` if the input is malformed
    /// or the tag does not verify under `key`.
    fn decrypt(&self, ciphertext: &[u8], key: &SymmetricKey) -> Result<Zeroizing<Vec<u8>>>;

    /// Encrypt and encode the sealed bytes as base64 text.
    fn encrypt_text(&self, plaintext: &[u8], key: &SymmetricKey) -> Result<String> {
        Ok(STANDARD.encode(self.encrypt(plaintext, key)?))
    }

    /// Decode base64 text produced by `encrypt_text` and decrypt it.
    ///
    /// Text that is not valid base64 is treated as a failed authentication.
    fn decrypt_text(&self, text: &str, key: &SymmetricKey) -> Result<Zeroizing<Vec<u8>>> {
        let sealed = STANDARD
            .decode(text.trim().as_bytes())
            .map_err(|_| KeeperError::AuthenticationFailed)?;
        self.decrypt(&sealed, key)
    }
}

/// AES-256-GCM codec with random nonces.
#[derive(Debug, Clone, Copy, Default)]
pub struct AesGcmCodec;

impl AesGcmCodec {
    pub fn new() -> Self {
        Self
    }

    fn cipher(key: &SymmetricKey) -> Result<Aes256Gcm> {
        Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| KeeperError::Crypto(format!("Invalid key: {}", e)))
    }
}

impl Codec for AesGcmCodec {
    fn generate_key(&self) -> Result<SymmetricKey> {
        SymmetricKey::generate()
    }

    fn encrypt(&self, plaintext: &[u8], key: &SymmetricKey) -> Result<Vec<u8>> {
        let cipher = Self::cipher(key)?;

        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        getrandom::getrandom(&mut nonce_bytes)
            .map_err(|e| KeeperError::Crypto(format!("Failed to generate nonce: {}", e)))?;

        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|e| KeeperError::Crypto(format!("Encryption failed: {}", e)))?;

        let mut packed = Vec::with_capacity(NONCE_LENGTH + sealed.len());
        packed.extend_from_slice(&nonce_bytes);
        packed.extend_from_slice(&sealed);
        Ok(packed)
    }

    fn decrypt(&self, ciphertext: &[u8], key: &SymmetricKey) -> Result<Zeroizing<Vec<u8>>> {
        if ciphertext.len() < NONCE_LENGTH + TAG_LENGTH {
            return Err(KeeperError::AuthenticationFailed);
        }

        let cipher = Self::cipher(key)?;
        let (nonce_bytes, sealed) = ciphertext.split_at(NONCE_LENGTH);

        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), sealed)
            .map(Zeroizing::new)
            .map_err(|_| KeeperError::AuthenticationFailed)
    }
}
