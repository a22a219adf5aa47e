//! File-based storage: per-server records and the command description map

pub mod descriptions;
pub mod servers;

pub use descriptions::{CommandDescriptions, CommandInfo, CommandOwner, DeclaredCommand, DescriptionEntry};
pub use servers::JsonServerStore;

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::application::errors::StorageError;

fn staged(path: &Path, contents: &str) -> Result<NamedTempFile, StorageError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    // Same directory as the target so the final rename never crosses filesystems
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    Ok(tmp)
}

/// Write `contents` to a uniquely named sibling file, then rename it over `path`.
///
/// Readers see either the old or the new file, never a partial write.
/// Concurrent writers each stage their own file; the last rename wins.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<(), StorageError> {
    staged(path, contents)?.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Like [`write_atomic`], but only if `path` does not exist yet.
///
/// Returns `false`, leaving the existing file untouched, when it does.
pub(crate) fn write_new_atomic(path: &Path, contents: &str) -> Result<bool, StorageError> {
    match staged(path, contents)?.persist_noclobber(path) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.error.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_concurrent_writers_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let path = Arc::new(dir.path().join("commands.json"));

        let writers: Vec<_> = (0..8)
            .map(|i| {
                let path = path.clone();
                std::thread::spawn(move || {
                    for round in 0..20 {
                        write_atomic(&path, &format!("{{\"writer\": {}, \"round\": {}}}", i, round))?;
                    }
                    Ok::<_, StorageError>(())
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap().unwrap();
        }

        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&*path).unwrap()).unwrap();
        assert_eq!(value["round"], 19);
        // Only the target is left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_write_new_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("42.json");

        assert!(write_new_atomic(&path, "first").unwrap());
        assert!(!write_new_atomic(&path, "second").unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "first");
        assert_eq!(fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }
}
