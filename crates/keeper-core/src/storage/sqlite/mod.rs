//! SQLite storage backend.
//!
//! Holds both the wrapped key versions and the encrypted secret records in a
//! single database file. Everything stored here is already encrypted by the
//! envelope layer; the database itself is not encrypted.

mod row;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension};

use crate::error::{KeeperError, Result};
use crate::storage::traits::{KeyVersionStore, SecretStore};
use crate::storage::types::SecretRecord;

use row::SecretRow;

/// Current on-disk format version.
pub const FORMAT_VERSION: &str = "1";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Metadata for a store file.
#[derive(Debug, Clone)]
pub struct StoreMetadata {
    /// Format version (e.g., "1")
    pub format_version: String,

    /// When this store was created
    pub created_at: DateTime<Utc>,
}

/// SQLite-backed key-version and secret store.
pub struct SqliteStore {
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a store at `path`, applying the schema if needed.
    ///
    /// Parent directories are created on demand.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::migrate(&conn)?;

        Ok(Self {
            path: Some(path.to_path_buf()),
            conn: Mutex::new(conn),
        })
    }

    /// Open a private in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::migrate(&conn)?;

        Ok(Self {
            path: None,
            conn: Mutex::new(conn),
        })
    }

    /// Path of the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Get store metadata.
    pub fn metadata(&self) -> Result<StoreMetadata> {
        let conn = self.lock_conn()?;

        let format_version: String = conn.query_row(
            "SELECT value FROM meta WHERE key = 'format_version'",
            [],
            |row| row.get(0),
        )?;
        let created_at_str: String = conn.query_row(
            "SELECT value FROM meta WHERE key = 'created_at'",
            [],
            |row| row.get(0),
        )?;
        let created_at = parse_timestamp(&created_at_str)?;

        Ok(StoreMetadata {
            format_version,
            created_at,
        })
    }

    /// Lock the database connection, returning an error if the mutex is poisoned.
    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| KeeperError::Storage("SQLite connection poisoned".to_string()))
    }

    fn migrate(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            -- Master-key-wrapped key versions (append-only)
            CREATE TABLE IF NOT EXISTS key_versions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                body TEXT NOT NULL,
                stored_at TEXT NOT NULL
            );

            -- Envelope-encrypted secrets
            CREATE TABLE IF NOT EXISTS secrets (
                owner INTEGER NOT NULL,
                name TEXT NOT NULL,
                uploaded_at TEXT NOT NULL,
                kind INTEGER NOT NULL,
                wrapped_key TEXT NOT NULL,
                ciphertext BLOB NOT NULL,

                PRIMARY KEY (owner, name)
            );
            "#,
        )?;

        let existing: Option<String> = conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'format_version'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            None => {
                let created_at = format_timestamp(&Utc::now());
                conn.execute(
                    "INSERT INTO meta (key, value) VALUES (?, ?)",
                    ["format_version", FORMAT_VERSION],
                )?;
                conn.execute(
                    "INSERT INTO meta (key, value) VALUES (?, ?)",
                    ("created_at", &created_at),
                )?;
            }
            Some(version) if version != FORMAT_VERSION => {
                return Err(KeeperError::Storage(format!(
                    "Unsupported store format version {} (expected {})",
                    version, FORMAT_VERSION
                )));
            }
            Some(_) => {}
        }

        Ok(())
    }
}

impl KeyVersionStore for SqliteStore {
    fn append(&self, wrapped: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO key_versions (body, stored_at) VALUES (?, ?)",
            (wrapped, format_timestamp(&Utc::now())),
        )?;
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<String>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare("SELECT body FROM key_versions ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut bodies = Vec::new();
        for row in rows {
            bodies.push(row?);
        }
        Ok(bodies)
    }
}

impl SecretStore for SqliteStore {
    fn insert(&self, record: &SecretRecord) -> Result<()> {
        let conn = self.lock_conn()?;
        let result = conn.execute(
            r#"
            INSERT INTO secrets (owner, name, uploaded_at, kind, wrapped_key, ciphertext)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            (
                record.owner,
                &record.name,
                format_timestamp(&record.uploaded_at),
                record.kind.code(),
                &record.wrapped_key,
                &record.ciphertext,
            ),
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(KeeperError::AlreadyExists(format!(
                    "Secret '{}' already exists",
                    record.name
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn get(&self, owner: i64, name: &str) -> Result<Option<SecretRecord>> {
        let conn = self.lock_conn()?;
        let row = conn
            .query_row(
                r#"
                SELECT owner, name, uploaded_at, kind, wrapped_key, ciphertext
                FROM secrets
                WHERE owner = ? AND name = ?
                "#,
                (owner, name),
                SecretRow::from_sql,
            )
            .optional()?;

        row.map(SecretRecord::try_from).transpose()
    }

    fn list(&self, owner: i64) -> Result<Vec<String>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare("SELECT name FROM secrets WHERE owner = ? ORDER BY name")?;
        let rows = stmt.query_map([owner], |row| row.get::<_, String>(0))?;

        let mut names = Vec::new();
        for row in rows {
            names.push(row?);
        }
        Ok(names)
    }

    fn delete(&self, owner: i64, name: &str) -> Result<bool> {
        let conn = self.lock_conn()?;
        let removed = conn.execute(
            "DELETE FROM secrets WHERE owner = ? AND name = ?",
            (owner, name),
        )?;
        Ok(removed > 0)
    }
}

fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .map_err(|e| KeeperError::Storage(format!("Invalid timestamp: {}", e)))?
        .with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::SecretKind;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn record(owner: i64, name: &str) -> SecretRecord {
        SecretRecord {
            owner,
            name: name.to_string(),
            uploaded_at: Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap(),
            kind: SecretKind::Login,
            wrapped_key: "d3JhcHBlZA==".to_string(),
            ciphertext: vec![0xde, 0xad, 0xbe, 0xef],
        }
    }

    #[test]
    fn test_insert_get_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let original = record(1, "github");

        store.insert(&original).unwrap();
        let loaded = store.get(1, "github").unwrap().unwrap();

        assert_eq!(loaded, original);
    }

    #[test]
    fn test_duplicate_insert_is_already_exists() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert(&record(1, "github")).unwrap();

        let result = store.insert(&record(1, "github"));
        assert!(matches!(result, Err(KeeperError::AlreadyExists(_))));

        // Same name under another owner is fine
        store.insert(&record(2, "github")).unwrap();
    }

    #[test]
    fn test_get_missing_returns_none() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.get(1, "missing").unwrap().is_none());
    }

    #[test]
    fn test_list_and_delete() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert(&record(1, "mail")).unwrap();
        store.insert(&record(1, "bank")).unwrap();
        store.insert(&record(3, "other")).unwrap();

        assert_eq!(store.list(1).unwrap(), vec!["bank", "mail"]);
        assert!(store.delete(1, "bank").unwrap());
        assert!(!store.delete(1, "bank").unwrap());
        assert_eq!(store.list(1).unwrap(), vec!["mail"]);
        assert!(store.list(99).unwrap().is_empty());
    }

    #[test]
    fn test_key_versions_keep_append_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.append("first").unwrap();
        store.append("second").unwrap();
        store.append("third").unwrap();

        assert_eq!(store.list_all().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("keeper.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.append("wrapped-version").unwrap();
            store.insert(&record(1, "github")).unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.list_all().unwrap(), vec!["wrapped-version"]);
        assert_eq!(store.get(1, "github").unwrap().unwrap(), record(1, "github"));
        assert_eq!(store.metadata().unwrap().format_version, FORMAT_VERSION);
        assert_eq!(store.path(), Some(path.as_path()));
    }
}
