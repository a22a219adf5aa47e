//! Module loader - turns source units into extension instances

use std::path::{Path, PathBuf};
use std::sync::Arc;
use libloading::{Library, Symbol};

use crate::extensions::{ExtensionModule, ScriptedExtension};
use super::manifest::{SourceUnit, UnitKind};

/// Function signature exported by native extension libraries
#[allow(improper_ctypes_definitions)]
pub type ExtensionInitFn = unsafe extern "C" fn() -> *mut dyn ExtensionModule;

/// Symbol native libraries must export (see `declare_extension!`)
pub const INIT_SYMBOL: &[u8] = b"odin_extension_init";

/// An instantiated, not yet set up, extension
pub struct LoadedModule {
    pub module: Box<dyn ExtensionModule>,
    /// Keeps the backing shared library mapped while anything from it is alive
    pub library: Option<Arc<Library>>,
}

impl LoadedModule {
    pub fn native(module: Box<dyn ExtensionModule>) -> Self {
        Self {
            module,
            library: None,
        }
    }
}

/// Instantiates extensions from their source text
pub trait ModuleLoader: Send + Sync {
    /// Check that `source` could be instantiated, without instantiating it
    fn validate(&self, name: &str, source: &str) -> Result<(), String>;

    fn instantiate(&self, name: &str, source: &str) -> Result<LoadedModule, String>;
}

/// Loader for YAML source units: scripted replies or native shared libraries
pub struct UnitLoader {
    library_dir: PathBuf,
}

impl UnitLoader {
    pub fn new(library_dir: impl Into<PathBuf>) -> Self {
        Self {
            library_dir: library_dir.into(),
        }
    }

    fn load_library(&self, name: &str, path: &Path) -> Result<LoadedModule, String> {
        let library_path = self.library_dir.join(path);
        if !library_path.exists() {
            return Err(format!("Library not found: {}", library_path.display()));
        }

        // The library runs with full trust in the host process
        let library = unsafe {
            Library::new(&library_path)
                .map_err(|e| format!("Failed to load library: {}", e))?
        };

        let module = unsafe {
            let init_fn: Symbol<ExtensionInitFn> = library
                .get(INIT_SYMBOL)
                .map_err(|e| format!("Failed to find init function: {}", e))?;

            let module_ptr = init_fn();
            if module_ptr.is_null() {
                return Err("Extension init returned null".to_string());
            }
            Box::from_raw(module_ptr)
        };

        if module.name() != name {
            tracing::warn!(
                "Library {} declares extension '{}', loading it as '{}'",
                library_path.display(),
                module.name(),
                name
            );
        }

        Ok(LoadedModule {
            module,
            library: Some(Arc::new(library)),
        })
    }
}

impl ModuleLoader for UnitLoader {
    fn validate(&self, _name: &str, source: &str) -> Result<(), String> {
        SourceUnit::parse(source).map(|_| ())
    }

    fn instantiate(&self, name: &str, source: &str) -> Result<LoadedModule, String> {
        let unit = SourceUnit::parse(source)?;
        match unit.kind()? {
            UnitKind::Script(reply) => Ok(LoadedModule::native(Box::new(ScriptedExtension::new(
                name,
                unit.description.clone(),
                unit.usage.clone(),
                reply,
            )))),
            UnitKind::Library(path) => self.load_library(name, path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instantiates_scripted_unit() {
        let loader = UnitLoader::new("/nonexistent");
        let loaded = loader.instantiate("weather", "reply: Sunny").unwrap();
        assert_eq!(loaded.module.name(), "weather");
        assert!(loaded.library.is_none());
    }

    #[test]
    fn test_missing_library_fails() {
        let dir = tempfile::tempdir().unwrap();
        let loader = UnitLoader::new(dir.path());
        let err = loader.instantiate("weather", "library: libweather.so").err().unwrap();
        assert!(err.contains("Library not found"));
    }

    #[test]
    fn test_non_library_file_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("libfake.so"), "not an object file").unwrap();
        let loader = UnitLoader::new(dir.path());
        let err = loader.instantiate("fake", "library: libfake.so").err().unwrap();
        assert!(err.contains("Failed to load library"));
    }
}
