//! SQLite backend for server records

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::application::errors::StorageError;
use crate::domain::entities::ServerRecord;
use crate::domain::traits::{RecordIter, ServerConfigStore};

/// Keeps each server's record as the same JSON document the file backend
/// writes, in `server_configs.extensions`.
pub struct SqliteServerStore {
    conn: Mutex<Connection>,
}

impl SqliteServerStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS server_configs (
                server_id TEXT PRIMARY KEY,
                extensions TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Database("Lock poisoned".to_string()))
    }
}

fn parse_record(server_id: &str, text: &str) -> Result<ServerRecord, StorageError> {
    serde_json::from_str(text).map_err(|e| StorageError::Corrupt {
        key: server_id.to_string(),
        reason: e.to_string(),
    })
}

impl ServerConfigStore for SqliteServerStore {
    fn load(&self, server_id: &str) -> Result<Option<ServerRecord>, StorageError> {
        let conn = self.conn()?;
        let text: Option<String> = conn
            .query_row(
                "SELECT extensions FROM server_configs WHERE server_id = ?1",
                params![server_id],
                |row| row.get(0),
            )
            .optional()?;

        text.map(|t| parse_record(server_id, &t)).transpose()
    }

    fn save(&self, server_id: &str, record: &ServerRecord) -> Result<(), StorageError> {
        let json = serde_json::to_string(record)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.conn()?.execute(
            "INSERT INTO server_configs (server_id, extensions) VALUES (?1, ?2)
             ON CONFLICT(server_id) DO UPDATE SET
                extensions = excluded.extensions,
                updated_at = datetime('now')",
            params![server_id, json],
        )?;
        Ok(())
    }

    fn create(&self, server_id: &str, record: &ServerRecord) -> Result<bool, StorageError> {
        let json = serde_json::to_string(record)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let inserted = self.conn()?.execute(
            "INSERT OR IGNORE INTO server_configs (server_id, extensions) VALUES (?1, ?2)",
            params![server_id, json],
        )?;
        Ok(inserted == 1)
    }

    fn records(&self) -> Result<RecordIter<'_>, StorageError> {
        // Rows are copied out so the connection lock is not held while callers iterate
        let rows: Vec<(String, String)> = {
            let conn = self.conn()?;
            let mut stmt =
                conn.prepare("SELECT server_id, extensions FROM server_configs ORDER BY server_id")?;
            let mapped = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            let rows = mapped.collect::<Result<Vec<_>, _>>()?;
            rows
        };

        Ok(Box::new(rows.into_iter().map(|(server_id, text)| {
            parse_record(&server_id, &text).map(|r| (server_id, r))
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_and_scan() {
        let store = SqliteServerStore::open_in_memory().unwrap();
        assert!(store.load("42").unwrap().is_none());

        let record: ServerRecord = ["weather"].into_iter().collect();
        store.save("42", &record).unwrap();
        store.save("42", &["weather", "time"].into_iter().collect()).unwrap();
        store.save("7", &ServerRecord::new()).unwrap();

        assert_eq!(store.load("42").unwrap().unwrap().names(), ["weather", "time"]);

        let ids: Vec<String> = store.records().unwrap().map(|r| r.unwrap().0).collect();
        assert_eq!(ids, vec!["42", "7"]);
    }

    #[test]
    fn test_create_only_inserts_missing_rows() {
        let store = SqliteServerStore::open_in_memory().unwrap();
        let record: ServerRecord = ["weather"].into_iter().collect();

        assert!(store.create("42", &record).unwrap());
        assert!(!store.create("42", &ServerRecord::new()).unwrap());
        assert_eq!(store.load("42").unwrap(), Some(record));
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("odin.db");

        let record: ServerRecord = ["weather"].into_iter().collect();
        SqliteServerStore::open(&path).unwrap().save("42", &record).unwrap();

        let reopened = SqliteServerStore::open(&path).unwrap();
        assert_eq!(reopened.load("42").unwrap(), Some(record));
    }

    #[test]
    fn test_corrupt_row_is_reported() {
        let store = SqliteServerStore::open_in_memory().unwrap();
        store
            .conn()
            .unwrap()
            .execute(
                "INSERT INTO server_configs (server_id, extensions) VALUES ('42', 'nope')",
                [],
            )
            .unwrap();
        assert!(matches!(store.load("42"), Err(StorageError::Corrupt { .. })));
    }
}
