//! SQLite-backed document storage.
//!
//! Every document lives in a single `kv` row. The `revision` column is bumped
//! on each write so [`SharedStateStore`](super::SharedStateStore) can perform
//! optimistic compare-and-swap updates across timers and processes.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::data_dir;
use super::store::{StoreBackend, Versioned};
use crate::error::StoreError;

/// Waiting time for a lock held by another process (CLI vs. daemon).
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite database holding the shared documents.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database at `~/.config/verdant/verdant.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, StoreError> {
        let dir = data_dir().map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        Self::open_at(dir.join("verdant.db"))
    }

    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        self.conn()?.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key        TEXT PRIMARY KEY,
                value      TEXT NOT NULL,
                revision   INTEGER NOT NULL DEFAULT 1,
                updated_at TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<Versioned>, StoreError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT value, revision FROM kv WHERE key = ?1",
                params![key],
                |row| {
                    Ok(Versioned {
                        value: row.get::<_, String>(0)?,
                        revision: row.get::<_, u64>(1)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Set a value in the kv store unconditionally. Returns the new revision.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        let revision = conn.query_row(
            "INSERT INTO kv (key, value, revision, updated_at) VALUES (?1, ?2, 1, ?3)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                revision = kv.revision + 1,
                updated_at = excluded.updated_at
             RETURNING revision",
            params![key, value, Utc::now().to_rfc3339()],
            |row| row.get::<_, u64>(0),
        )?;
        Ok(revision)
    }

    /// Write `value` only if the row is still at `expected` revision
    /// (`None` meaning the key must be absent).
    pub fn kv_compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        value: &str,
    ) -> Result<Option<u64>, StoreError> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        match expected {
            None => {
                let changed = conn.execute(
                    "INSERT INTO kv (key, value, revision, updated_at) VALUES (?1, ?2, 1, ?3)
                     ON CONFLICT(key) DO NOTHING",
                    params![key, value, now],
                )?;
                Ok((changed == 1).then_some(1))
            }
            Some(revision) => {
                let changed = conn.execute(
                    "UPDATE kv SET value = ?2, revision = revision + 1, updated_at = ?3
                     WHERE key = ?1 AND revision = ?4",
                    params![key, value, now, revision],
                )?;
                Ok((changed == 1).then_some(revision + 1))
            }
        }
    }
}

impl StoreBackend for Database {
    fn read(&self, key: &str) -> Result<Option<Versioned>, StoreError> {
        self.kv_get(key)
    }

    fn write(&self, key: &str, value: &str) -> Result<u64, StoreError> {
        self.kv_set(key, value)
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        value: &str,
    ) -> Result<Option<u64>, StoreError> {
        self.kv_compare_and_swap(key, expected, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kv_store() {
        let db = Database::open_memory().unwrap();
        assert!(db.kv_get("test").unwrap().is_none());
        assert_eq!(db.kv_set("test", "hello").unwrap(), 1);
        let stored = db.kv_get("test").unwrap().unwrap();
        assert_eq!(stored.value, "hello");
        assert_eq!(stored.revision, 1);
        assert_eq!(db.kv_set("test", "again").unwrap(), 2);
    }

    #[test]
    fn compare_and_swap_rejects_stale_revision() {
        let db = Database::open_memory().unwrap();
        assert_eq!(db.kv_compare_and_swap("doc", None, "a").unwrap(), Some(1));
        // Key exists now, so an "absent" expectation loses.
        assert_eq!(db.kv_compare_and_swap("doc", None, "b").unwrap(), None);
        assert_eq!(db.kv_compare_and_swap("doc", Some(1), "c").unwrap(), Some(2));
        assert_eq!(db.kv_compare_and_swap("doc", Some(1), "d").unwrap(), None);
        assert_eq!(db.kv_get("doc").unwrap().unwrap().value, "c");
    }

    #[test]
    fn on_disk_database_persists_between_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("verdant.db");
        {
            let db = Database::open_at(&path).unwrap();
            db.kv_set("sessionState", "{}").unwrap();
        }
        let db = Database::open_at(&path).unwrap();
        assert_eq!(db.kv_get("sessionState").unwrap().unwrap().value, "{}");
    }
}
