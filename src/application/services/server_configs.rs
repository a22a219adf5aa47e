//! Per-server extension records on top of a [`ServerConfigStore`] backend

use std::sync::Arc;
use tracing::{debug, warn};

use crate::application::errors::{ExtensionError, StorageError};
use crate::domain::entities::ServerRecord;
use crate::domain::traits::{RecordIter, ServerConfigStore};

/// Get/enable/disable semantics for server records.
///
/// Every mutation is persisted before it returns. The base extension is
/// implicit: it is never written to a record.
pub struct ServerConfigs {
    store: Arc<dyn ServerConfigStore>,
    base: String,
}

impl ServerConfigs {
    pub fn new(store: Arc<dyn ServerConfigStore>, base: impl Into<String>) -> Self {
        Self {
            store,
            base: base.into(),
        }
    }

    /// The server's record, creating and persisting an empty one on first access.
    ///
    /// Creation never overwrites a record written since the load.
    pub fn get(&self, server_id: &str) -> Result<ServerRecord, StorageError> {
        if let Some(record) = self.store.load(server_id)? {
            return Ok(record);
        }

        let record = ServerRecord::new();
        if self.store.create(server_id, &record)? {
            debug!("Created empty record for server {}", server_id);
            return Ok(record);
        }

        debug!("Record for server {} appeared while creating it", server_id);
        Ok(self.store.load(server_id)?.unwrap_or(record))
    }

    pub fn enable(&self, server_id: &str, name: &str) -> Result<ServerRecord, ExtensionError> {
        if name == self.base {
            return Err(ExtensionError::AlreadyEnabled(name.to_string()));
        }

        let mut record = self.get(server_id)?;
        if !record.insert(name) {
            return Err(ExtensionError::AlreadyEnabled(name.to_string()));
        }
        self.store.save(server_id, &record)?;
        Ok(record)
    }

    pub fn disable(&self, server_id: &str, name: &str) -> Result<ServerRecord, ExtensionError> {
        if name == self.base {
            return Err(ExtensionError::ProtectedExtension(name.to_string()));
        }

        let mut record = self.get(server_id)?;
        if !record.remove(name) {
            return Err(ExtensionError::NotEnabled(name.to_string()));
        }
        self.store.save(server_id, &record)?;
        Ok(record)
    }

    /// Every persisted record, re-read from storage on each call
    pub fn all_records(&self) -> Result<RecordIter<'_>, StorageError> {
        self.store.records()
    }

    /// Whether any server record still contains `name`.
    ///
    /// Full scan, O(servers). A record that cannot be read counts as a
    /// reference, so a scan failure never unloads an extension in use.
    pub fn is_referenced(&self, name: &str) -> bool {
        let records = match self.all_records() {
            Ok(records) => records,
            Err(e) => {
                warn!("Reference scan for '{}' failed: {}", name, e);
                return true;
            }
        };

        let mut unreadable = Vec::new();
        for entry in records {
            match entry {
                Ok((_, record)) if record.contains(name) => return true,
                Ok(_) => {}
                Err(StorageError::Corrupt { key, reason }) => {
                    warn!("Record for server {} is corrupt: {}", key, reason);
                    unreadable.push(key);
                }
                Err(e) => {
                    warn!("Unreadable record during reference scan for '{}': {}", name, e);
                    unreadable.push(e.to_string());
                }
            }
        }

        if unreadable.is_empty() {
            return false;
        }
        warn!(
            "Keeping '{}' loaded: {} record(s) could not be read ({})",
            name,
            unreadable.len(),
            unreadable.join(", ")
        );
        true
    }
}
