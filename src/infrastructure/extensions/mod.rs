//! Extension loading infrastructure
//!
//! Each extension's source is a YAML unit stored under the extensions
//! directory. Units either carry a reply template or name a shared library
//! exporting `odin_extension_init`.

pub mod loader;
pub mod manifest;
pub mod source_store;

pub use loader::{LoadedModule, ModuleLoader, UnitLoader};
pub use manifest::{SourceUnit, UnitKind};
pub use source_store::{FsSourceStore, MemorySourceStore};
