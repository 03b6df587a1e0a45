//! Storage abstraction for Keeper.
//!
//! This module defines the collaborator traits the key-management core
//! depends on, the persisted record types, and two backends:
//! - `SqliteStore`: durable, single-file SQLite database
//! - `MemoryStore`: volatile, for tests and embedding
//!
//! Stores only ever see sealed data: wrapped key versions, wrapped secret keys
//! and ciphertext.

pub mod memory;
pub mod sqlite;
pub mod traits;
pub mod types;

// Re-export public types
pub use memory::MemoryStore;
pub use sqlite::{SqliteStore, StoreMetadata};
pub use traits::{KeyVersionStore, SecretStore};
pub use types::{validate_name, NewSecret, Secret, SecretKind, SecretRecord, MAX_NAME_LENGTH};
