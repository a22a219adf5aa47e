//! Extension source stores

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use crate::application::errors::StorageError;
use crate::domain::entities::is_valid_name;
use crate::domain::traits::SourceStore;
use crate::infrastructure::storage::write_atomic;

/// One `<name>.yaml` file per extension in a directory
pub struct FsSourceStore {
    dir: PathBuf,
}

impl FsSourceStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn unit_path(&self, name: &str) -> Result<PathBuf, StorageError> {
        if !is_valid_name(name) {
            return Err(StorageError::InvalidKey(name.to_string()));
        }
        Ok(self.dir.join(format!("{}.yaml", name)))
    }
}

impl SourceStore for FsSourceStore {
    fn exists(&self, name: &str) -> bool {
        self.unit_path(name).map(|p| p.is_file()).unwrap_or(false)
    }

    fn read(&self, name: &str) -> Result<String, StorageError> {
        let path = self.unit_path(name)?;
        fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound(name.to_string()),
            _ => StorageError::Io(e),
        })
    }

    fn write(&self, name: &str, source: &str) -> Result<(), StorageError> {
        let path = self.unit_path(name)?;
        write_atomic(&path, source)
    }

    fn names(&self) -> Result<Vec<String>, StorageError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension() != Some(OsStr::new("yaml")) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if is_valid_name(stem) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Source store held in memory; nothing survives the process
#[derive(Default)]
pub struct MemorySourceStore {
    units: RwLock<BTreeMap<String, String>>,
}

impl MemorySourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.units
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), source.into());
        self
    }
}

impl SourceStore for MemorySourceStore {
    fn exists(&self, name: &str) -> bool {
        self.units
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    fn read(&self, name: &str) -> Result<String, StorageError> {
        self.units
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    fn write(&self, name: &str, source: &str) -> Result<(), StorageError> {
        if !is_valid_name(name) {
            return Err(StorageError::InvalidKey(name.to_string()));
        }
        self.units
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), source.to_string());
        Ok(())
    }

    fn names(&self) -> Result<Vec<String>, StorageError> {
        Ok(self
            .units
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fs_store_write_read_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSourceStore::new(dir.path().join("extensions"));

        assert!(!store.exists("weather"));
        assert!(matches!(store.read("weather"), Err(StorageError::NotFound(_))));

        store.write("weather", "reply: Sunny").unwrap();
        assert!(store.exists("weather"));
        store.write("weather", "reply: Rainy").unwrap();
        assert_eq!(store.read("weather").unwrap(), "reply: Rainy");

        store.write("time", "reply: noon").unwrap();
        assert_eq!(store.names().unwrap(), vec!["time", "weather"]);
    }

    #[test]
    fn test_fs_store_rejects_bad_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSourceStore::new(dir.path());
        assert!(matches!(store.write("../evil", "x"), Err(StorageError::InvalidKey(_))));
        assert!(!store.exists(".hidden"));
    }
}
