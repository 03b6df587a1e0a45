//! In-memory store.
//!
//! Implements both storage traits with no durability. Used by tests and by
//! embedders that persist records elsewhere.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::{KeeperError, Result};
use crate::storage::traits::{KeyVersionStore, SecretStore};
use crate::storage::types::SecretRecord;

/// In-memory key-version and secret store.
#[derive(Default)]
pub struct MemoryStore {
    versions: Mutex<Vec<String>>,
    secrets: Mutex<BTreeMap<(i64, String), SecretRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of wrapped key versions appended so far.
    pub fn version_count(&self) -> Result<usize> {
        Ok(lock(&self.versions)?.len())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| KeeperError::Storage("Memory store poisoned".to_string()))
}

impl KeyVersionStore for MemoryStore {
    fn append(&self, wrapped: &str) -> Result<()> {
        lock(&self.versions)?.push(wrapped.to_string());
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<String>> {
        Ok(lock(&self.versions)?.clone())
    }
}

impl SecretStore for MemoryStore {
    fn insert(&self, record: &SecretRecord) -> Result<()> {
        let mut secrets = lock(&self.secrets)?;
        let key = (record.owner, record.name.clone());
        if secrets.contains_key(&key) {
            return Err(KeeperError::AlreadyExists(format!(
                "Secret '{}' already exists",
                record.name
            )));
        }
        secrets.insert(key, record.clone());
        Ok(())
    }

    fn get(&self, owner: i64, name: &str) -> Result<Option<SecretRecord>> {
        Ok(lock(&self.secrets)?
            .get(&(owner, name.to_string()))
            .cloned())
    }

    fn list(&self, owner: i64) -> Result<Vec<String>> {
        Ok(lock(&self.secrets)?
            .keys()
            .filter(|(record_owner, _)| *record_owner == owner)
            .map(|(_, name)| name.clone())
            .collect())
    }

    fn delete(&self, owner: i64, name: &str) -> Result<bool> {
        Ok(lock(&self.secrets)?
            .remove(&(owner, name.to_string()))
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::SecretKind;
    use chrono::Utc;

    fn record(owner: i64, name: &str) -> SecretRecord {
        SecretRecord {
            owner,
            name: name.to_string(),
            uploaded_at: Utc::now(),
            kind: SecretKind::Text,
            wrapped_key: "wrapped".to_string(),
            ciphertext: vec![1, 2, 3],
        }
    }

    #[test]
    fn test_versions_append_and_list() {
        let store = MemoryStore::new();
        store.append("a").unwrap();
        store.append("b").unwrap();
        assert_eq!(store.list_all().unwrap(), vec!["a", "b"]);
        assert_eq!(store.version_count().unwrap(), 2);
    }

    #[test]
    fn test_secret_lifecycle() {
        let store = MemoryStore::new();
        store.insert(&record(1, "zeta")).unwrap();
        store.insert(&record(1, "alpha")).unwrap();
        store.insert(&record(2, "other")).unwrap();

        assert!(matches!(
            store.insert(&record(1, "alpha")),
            Err(KeeperError::AlreadyExists(_))
        ));
        assert_eq!(store.list(1).unwrap(), vec!["alpha", "zeta"]);
        assert!(store.get(1, "alpha").unwrap().is_some());
        assert!(store.get(2, "alpha").unwrap().is_none());

        assert!(store.delete(1, "alpha").unwrap());
        assert!(!store.delete(1, "alpha").unwrap());
        assert_eq!(store.list(1).unwrap(), vec!["zeta"]);
    }
}
