//! JSON-file backend for server records: one `<server_id>.json` per server

use std::ffi::OsStr;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::application::errors::StorageError;
use crate::domain::entities::{is_valid_name, ServerRecord};
use crate::domain::traits::{RecordIter, ServerConfigStore};
use super::{write_atomic, write_new_atomic};

/// Stores each server's record as `{ "extensions": [...] }` in its own file
pub struct JsonServerStore {
    dir: PathBuf,
}

impl JsonServerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, server_id: &str) -> Result<PathBuf, StorageError> {
        if !is_valid_name(server_id) {
            return Err(StorageError::InvalidKey(server_id.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", server_id)))
    }
}

fn parse_record(server_id: &str, text: &str) -> Result<ServerRecord, StorageError> {
    serde_json::from_str(text).map_err(|e| StorageError::Corrupt {
        key: server_id.to_string(),
        reason: e.to_string(),
    })
}

impl ServerConfigStore for JsonServerStore {
    fn load(&self, server_id: &str) -> Result<Option<ServerRecord>, StorageError> {
        let path = self.record_path(server_id)?;
        match fs::read_to_string(&path) {
            Ok(text) => parse_record(server_id, &text).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, server_id: &str, record: &ServerRecord) -> Result<(), StorageError> {
        let path = self.record_path(server_id)?;
        let json = serde_json::to_string_pretty(record)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        write_atomic(&path, &json)
    }

    fn create(&self, server_id: &str, record: &ServerRecord) -> Result<bool, StorageError> {
        let path = self.record_path(server_id)?;
        let json = serde_json::to_string_pretty(record)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        write_new_atomic(&path, &json)
    }

    fn records(&self) -> Result<RecordIter<'_>, StorageError> {
        if !self.dir.exists() {
            return Ok(Box::new(std::iter::empty()));
        }

        let entries = fs::read_dir(&self.dir)?;
        Ok(Box::new(entries.filter_map(|entry| {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => return Some(Err(e.into())),
            };
            if path.extension() != Some(OsStr::new("json")) {
                return None;
            }
            let server_id = path.file_stem()?.to_str()?.to_string();
            if server_id.starts_with('.') {
                return None;
            }

            let record = fs::read_to_string(&path)
                .map_err(StorageError::from)
                .and_then(|text| parse_record(&server_id, &text));
            Some(record.map(|r| (server_id, r)))
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_record_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonServerStore::new(dir.path().join("servers"));
        assert!(store.load("42").unwrap().is_none());
        assert_eq!(store.records().unwrap().count(), 0);
    }

    #[test]
    fn test_save_then_load_and_scan() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonServerStore::new(dir.path());

        let record: ServerRecord = ["weather", "time"].into_iter().collect();
        store.save("42", &record).unwrap();
        store.save("7", &ServerRecord::new()).unwrap();

        // A restarted process sees the same record
        let reopened = JsonServerStore::new(dir.path());
        assert_eq!(reopened.load("42").unwrap(), Some(record.clone()));

        let mut all: Vec<_> = reopened.records().unwrap().map(|r| r.unwrap()).collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(all, vec![("42".to_string(), record), ("7".to_string(), ServerRecord::new())]);
    }

    #[test]
    fn test_corrupt_record_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("42.json"), "{ not json").unwrap();
        let store = JsonServerStore::new(dir.path());

        assert!(matches!(store.load("42"), Err(StorageError::Corrupt { .. })));
        let scanned: Vec<_> = store.records().unwrap().collect();
        assert_eq!(scanned.len(), 1);
        assert!(scanned[0].is_err());
    }

    #[test]
    fn test_create_never_replaces_a_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonServerStore::new(dir.path());

        let record: ServerRecord = ["weather"].into_iter().collect();
        assert!(store.create("42", &record).unwrap());
        assert!(!store.create("42", &ServerRecord::new()).unwrap());
        assert_eq!(store.load("42").unwrap(), Some(record));
        assert_eq!(store.records().unwrap().count(), 1);
    }

    #[test]
    fn test_rejects_path_like_server_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonServerStore::new(dir.path());
        assert!(matches!(store.load("../x"), Err(StorageError::InvalidKey(_))));
    }
}
