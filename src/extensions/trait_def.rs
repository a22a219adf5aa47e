//! Extension module contract

use std::sync::Arc;

use crate::domain::entities::{is_valid_name, Command};
use crate::infrastructure::storage::CommandDescriptions;

/// Core trait every loadable extension implements
pub trait ExtensionModule: Send + Sync {
    /// Unique identifier for the extension
    fn name(&self) -> &str;

    /// Initialization entry point: register the extension's commands
    fn setup(&mut self, ctx: &mut SetupContext) -> Result<(), String>;

    /// Optional teardown hook, run when the extension is unloaded
    fn teardown(&mut self) -> Result<(), String> {
        Ok(())
    }
}

/// Factory for extensions compiled into the bot
pub type BuiltinFactory = fn() -> Box<dyn ExtensionModule>;

/// Handed to [`ExtensionModule::setup`] to collect the commands it exposes
pub struct SetupContext {
    extension: String,
    descriptions: Arc<CommandDescriptions>,
    commands: Vec<Command>,
}

impl SetupContext {
    pub(crate) fn new(extension: impl Into<String>, descriptions: Arc<CommandDescriptions>) -> Self {
        Self {
            extension: extension.into(),
            descriptions,
            commands: Vec::new(),
        }
    }

    /// Name of the extension being set up
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// The process-wide description map, for introspection commands
    pub fn descriptions(&self) -> Arc<CommandDescriptions> {
        self.descriptions.clone()
    }

    pub fn register(&mut self, command: Command) -> Result<(), String> {
        if !is_valid_name(&command.name) {
            return Err(format!("invalid command name '{}'", command.name));
        }
        if self.commands.iter().any(|c| c.name == command.name) {
            return Err(format!("command '{}' registered twice", command.name));
        }
        self.commands.push(command);
        Ok(())
    }

    pub(crate) fn into_commands(self) -> Vec<Command> {
        self.commands
    }
}

/// Export an extension from a shared library.
///
/// The library must be built against the same `odin-bot` version as the host.
///
/// ```ignore
/// odin_bot::declare_extension!(Weather::default());
/// ```
#[macro_export]
macro_rules! declare_extension {
    ($ctor:expr) => {
        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn odin_extension_init() -> *mut dyn $crate::extensions::ExtensionModule {
            let module: Box<dyn $crate::extensions::ExtensionModule> = Box::new($ctor);
            Box::into_raw(module)
        }
    };
}
