//! Cryptographic primitives for Keeper.
//!
//! - **AES-256-GCM**: authenticated encryption for every layer of the key
//!   hierarchy (master key → key versions → secret keys → secret data)
//! - **Argon2id**: optional passphrase-derived master keys
//!
//! ## Security Model
//!
//! - Key bytes are zeroized on drop and redacted from `Debug`
//! - Decrypted buffers are returned as `Zeroizing<Vec<u8>>`
//! - A nonce is never reused: each encryption draws a fresh random nonce
//!
//! ## Threat Model
//!
//! We defend against:
//! - Theft or tampering of the secret record store
//! - Theft of the key-version store without the master key
//!
//! We do NOT defend against:
//! - A compromised server process / memory disclosure
//! - Loss of the master key (stored data is unrecoverable)

pub mod codec;
pub mod key;

pub use codec::{AesGcmCodec, Codec, NONCE_LENGTH, TAG_LENGTH};
pub use key::{MasterKey, SymmetricKey, KEY_LENGTH};
