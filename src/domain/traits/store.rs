use crate::application::errors::StorageError;
use crate::domain::entities::ServerRecord;

/// One `(server_id, record)` pair from a full scan
pub type RecordEntry = Result<(String, ServerRecord), StorageError>;

/// Lazily produced records; every call to [`ServerConfigStore::records`] re-reads storage
pub type RecordIter<'a> = Box<dyn Iterator<Item = RecordEntry> + 'a>;

/// Persistence backend for per-server extension records
pub trait ServerConfigStore: Send + Sync {
    /// Load the record for a server, `None` if it was never written.
    /// Unparseable records are reported as [`StorageError::Corrupt`].
    fn load(&self, server_id: &str) -> Result<Option<ServerRecord>, StorageError>;

    /// Persist the record for a server, replacing any previous one
    fn save(&self, server_id: &str, record: &ServerRecord) -> Result<(), StorageError>;

    /// Persist `record` only if the server has none yet.
    /// Returns `false` when another record was already there; it is left as is.
    fn create(&self, server_id: &str, record: &ServerRecord) -> Result<bool, StorageError>;

    /// Enumerate every persisted record
    fn records(&self) -> Result<RecordIter<'_>, StorageError>;
}

/// Storage for extension source units, one per extension name.
///
/// No delete: source removal happens out of band.
pub trait SourceStore: Send + Sync {
    fn exists(&self, name: &str) -> bool;

    fn read(&self, name: &str) -> Result<String, StorageError>;

    /// Create or overwrite the source for `name`
    fn write(&self, name: &str, source: &str) -> Result<(), StorageError>;

    /// Names of every stored source unit, sorted
    fn names(&self) -> Result<Vec<String>, StorageError>;
}
