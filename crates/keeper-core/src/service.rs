//! Secret service: per-owner CRUD over envelope-encrypted records.

use std::sync::Arc;

use crate::envelope::EnvelopeManager;
use crate::error::{KeeperError, Result};
use crate::storage::{validate_name, NewSecret, Secret, SecretRecord, SecretStore};

/// Stores and retrieves secrets, sealing every payload on the way in.
pub struct SecretService {
    envelope: EnvelopeManager,
    store: Arc<dyn SecretStore>,
}

impl SecretService {
    pub fn new(envelope: EnvelopeManager, store: Arc<dyn SecretStore>) -> Self {
        Self { envelope, store }
    }

    /// Seal and store a new secret.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if the name is empty or too long
    /// - `AlreadyExists` if the owner already has a secret with this name
    pub fn write(&self, secret: NewSecret) -> Result<()> {
        validate_name(&secret.name)?;

        let sealed = self.envelope.wrap(&secret.data)?;
        let record = SecretRecord {
            owner: secret.owner,
            name: secret.name.clone(),
            uploaded_at: sealed.sealed_at,
            kind: secret.kind,
            wrapped_key: sealed.wrapped_key,
            ciphertext: sealed.ciphertext,
        };
        self.store.insert(&record)?;

        tracing::debug!(
            owner = secret.owner,
            name = %secret.name,
            kind = %secret.kind,
            "Stored secret"
        );
        Ok(())
    }

    /// Fetch and open a secret.
    ///
    /// The stored record is never modified, even when opening fails.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no such secret exists
    /// - `VersionNotFound`, `UnwrapAuthenticationFailed` or
    ///   `DataAuthenticationFailed` if the record cannot be opened
    pub fn read(&self, owner: i64, name: &str) -> Result<Secret> {
        let record = self
            .store
            .get(owner, name)?
            .ok_or_else(|| KeeperError::NotFound(format!("Secret '{}'", name)))?;

        let data = self
            .envelope
            .unwrap(&record.ciphertext, &record.wrapped_key, record.uploaded_at)
            .inspect_err(|e| {
                tracing::warn!(owner, name = %name, error = %e, "Failed to open secret");
            })?;

        tracing::debug!(owner, name = %name, "Read secret");
        Ok(Secret {
            owner: record.owner,
            name: record.name,
            kind: record.kind,
            uploaded_at: record.uploaded_at,
            data,
        })
    }

    /// Names of an owner's secrets, ascending.
    pub fn list(&self, owner: i64) -> Result<Vec<String>> {
        self.store.list(owner)
    }

    /// Remove a secret.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such secret exists.
    pub fn delete(&self, owner: i64, name: &str) -> Result<()> {
        if !self.store.delete(owner, name)? {
            return Err(KeeperError::NotFound(format!("Secret '{}'", name)));
        }
        tracing::debug!(owner, name = %name, "Deleted secret");
        Ok(())
    }
}
