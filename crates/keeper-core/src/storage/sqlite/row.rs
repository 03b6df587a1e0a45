//! Secret row type for database queries.

use chrono::{DateTime, Utc};

use crate::error::{KeeperError, Result};
use crate::storage::types::{SecretKind, SecretRecord};

/// Raw row data from the secrets table, before parsing into domain types.
#[derive(Debug)]
pub struct SecretRow {
    pub owner: i64,
    pub name: String,
    pub uploaded_at: String,
    pub kind: i64,
    pub wrapped_key: String,
    pub ciphertext: Vec<u8>,
}

impl SecretRow {
    pub fn from_sql(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            owner: row.get(0)?,
            name: row.get(1)?,
            uploaded_at: row.get(2)?,
            kind: row.get(3)?,
            wrapped_key: row.get(4)?,
            ciphertext: row.get(5)?,
        })
    }
}

impl TryFrom<SecretRow> for SecretRecord {
    type Error = KeeperError;

    fn try_from(row: SecretRow) -> Result<Self> {
        let uploaded_at = DateTime::parse_from_rfc3339(&row.uploaded_at)
            .map_err(|e| KeeperError::Storage(format!("Invalid upload timestamp: {}", e)))?
            .with_timezone(&Utc);
        let kind = SecretKind::try_from(row.kind)?;

        Ok(SecretRecord {
            owner: row.owner,
            name: row.name,
            uploaded_at,
            kind,
            wrapped_key: row.wrapped_key,
            ciphertext: row.ciphertext,
        })
    }
}
