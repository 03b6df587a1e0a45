//! # Keeper Core
//!
//! Core library for Keeper - the server-side encryption engine of a secrets
//! manager.
//!
//! Secrets are protected by a three-level key hierarchy:
//!
//! ```text
//! MasterKey ──wraps──▶ KeyVersion ──wraps──▶ one-time secret key ──seals──▶ data
//! ```
//!
//! The master key is supplied at process start and never stored. Key versions
//! are rotated on a fixed interval and retained forever; each secret record
//! keeps its upload timestamp, which selects the version that wrapped it.
//!
//! ## Architecture
//!
//! - **crypto**: AES-256-GCM codec and key types
//! - **ledger**: ordered key versions, lookup and rotation
//! - **envelope**: per-secret wrap/unwrap
//! - **bootstrap**: startup loading and the rotation controller
//! - **service**: per-owner secret CRUD
//! - **storage**: store traits plus SQLite and in-memory backends

pub mod bootstrap;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod fs;
pub mod ledger;
pub mod service;
pub mod storage;

pub use bootstrap::{RotationController, RotationPolicy};
pub use crypto::{AesGcmCodec, Codec, MasterKey, SymmetricKey};
pub use envelope::{EnvelopeManager, Sealed};
pub use error::{KeeperError, Result};
pub use ledger::{KeyLedger, KeyVersion, Ledger, RotationStatus, SealPoint, VersionInfo};
pub use service::SecretService;
pub use storage::{KeyVersionStore, SecretStore};

/// Core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
