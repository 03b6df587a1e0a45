//! Storage collaborator traits.
//!
//! The core never talks to a database directly. Wrapped key versions and
//! secret records go through these two traits, so any durable backend can be
//! plugged in without changing the key-management logic.

use super::types::SecretRecord;
use crate::error::Result;

/// Durable store for master-key-wrapped key versions.
///
/// Each entry is the opaque text form of one sealed key version. The store
/// never interprets entries and never deletes them: retired versions are kept
/// forever so historical secrets stay decryptable.
pub trait KeyVersionStore: Send + Sync {
    /// Durably append one wrapped key version.
    ///
    /// The call must not return `Ok` until the entry would survive a restart.
    ///
    /// # Errors
    ///
    /// Returns `KeeperError::Storage` (or a backend-specific variant) if the
    /// entry could not be persisted. Nothing may be partially written.
    fn append(&self, wrapped: &str) -> Result<()>;

    /// List every wrapped key version. Order is not significant.
    fn list_all(&self) -> Result<Vec<String>>;
}

/// Durable store for encrypted secret records.
pub trait SecretStore: Send + Sync {
    /// Insert a new record.
    ///
    /// The record's `uploaded_at` is stored verbatim and never changed
    /// afterwards.
    ///
    /// # Errors
    ///
    /// Returns `KeeperError::AlreadyExists` if `(owner, name)` is taken.
    fn insert(&self, record: &SecretRecord) -> Result<()>;

    /// Get a record by owner and name.
    ///
    /// # Returns
    ///
    /// Returns `Ok(Some(record))` if found, `Ok(None)` if not found.
    fn get(&self, owner: i64, name: &str) -> Result<Option<SecretRecord>>;

    /// List the names of an owner's records in ascending order.
    fn list(&self, owner: i64) -> Result<Vec<String>>;

    /// Delete a record.
    ///
    /// # Returns
    ///
    /// Returns `Ok(true)` if a record was removed, `Ok(false)` if none existed.
    fn delete(&self, owner: i64, name: &str) -> Result<bool>;
}
