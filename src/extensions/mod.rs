//! Extension system for odin-bot
//!
//! Extensions are command modules loaded and unloaded at runtime. The base
//! extension (`general`) is compiled in; others come from source units in the
//! extensions directory.

pub mod general;
pub mod registry;
pub mod scripted;
pub mod trait_def;

pub use general::BASE_EXTENSION;
pub use registry::{ExtensionRegistry, ResolvedCommand};
pub use scripted::ScriptedExtension;
pub use trait_def::{BuiltinFactory, ExtensionModule, SetupContext};
