//! Extension registry - the in-process record of which extensions are loaded

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use libloading::Library;
use tracing::{error, info, warn};

use crate::application::errors::ExtensionError;
use crate::domain::entities::{Command, CommandTable, ExtensionState};
use crate::domain::traits::SourceStore;
use crate::infrastructure::extensions::{LoadedModule, ModuleLoader};
use crate::infrastructure::storage::{CommandDescriptions, CommandOwner, DeclaredCommand};
use super::trait_def::{BuiltinFactory, SetupContext};
use super::ExtensionModule;

// Fields drop in order: command closures, then the module, then its library.
struct LoadedExtension {
    commands: CommandTable,
    module: Box<dyn ExtensionModule>,
    library: Option<Arc<Library>>,
}

/// A live command found by name
pub struct ResolvedCommand {
    pub owner: String,
    pub command: Arc<Command>,
    _library: Option<Arc<Library>>,
}

/// Map of extension name to loaded module.
///
/// Loads hold the write lock for their whole duration, so two racing
/// `ensure_loaded` calls for one name instantiate it once. Teardown hooks run
/// after the entry is removed and the lock released.
pub struct ExtensionRegistry {
    entries: RwLock<HashMap<String, LoadedExtension>>,
    builtins: HashMap<String, BuiltinFactory>,
    sources: Arc<dyn SourceStore>,
    loader: Arc<dyn ModuleLoader>,
    descriptions: Arc<CommandDescriptions>,
}

impl ExtensionRegistry {
    pub fn new(
        sources: Arc<dyn SourceStore>,
        loader: Arc<dyn ModuleLoader>,
        descriptions: Arc<CommandDescriptions>,
    ) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            builtins: HashMap::new(),
            sources,
            loader,
            descriptions,
        }
    }

    /// Register an extension compiled into the bot; it needs no source unit
    pub fn with_builtin(mut self, name: impl Into<String>, factory: BuiltinFactory) -> Self {
        self.builtins.insert(name.into(), factory);
        self
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.builtins.contains_key(name)
    }

    pub fn descriptions(&self) -> &Arc<CommandDescriptions> {
        &self.descriptions
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, LoadedExtension>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, LoadedExtension>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self, name: &str) -> ExtensionState {
        if self.is_loaded(name) {
            ExtensionState::Loaded
        } else {
            ExtensionState::Unloaded
        }
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    pub fn loaded_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Find the live command bound under `name`
    pub fn resolve(&self, name: &str) -> Option<ResolvedCommand> {
        self.read().iter().find_map(|(owner, entry)| {
            entry.commands.get(name).map(|command| ResolvedCommand {
                owner: owner.clone(),
                command: command.clone(),
                _library: entry.library.clone(),
            })
        })
    }

    /// Check source text for `name` without instantiating it
    pub fn validate_source(&self, name: &str, source: &str) -> Result<(), ExtensionError> {
        self.loader
            .validate(name, source)
            .map_err(|reason| ExtensionError::InvalidSource {
                name: name.to_string(),
                reason,
            })
    }

    /// Load `name` unless it is already loaded.
    ///
    /// Returns `true` when this call instantiated the extension. On failure
    /// the extension stays unloaded.
    pub fn ensure_loaded(&self, name: &str) -> Result<bool, ExtensionError> {
        let mut entries = self.write();
        if entries.contains_key(name) {
            return Ok(false);
        }

        let LoadedModule { mut module, library } = self.instantiate(name)?;

        let mut ctx = SetupContext::new(name, self.descriptions.clone());
        if let Err(reason) = module.setup(&mut ctx) {
            error!("Extension '{}' failed to initialize: {}", name, reason);
            drop(ctx);
            drop(module);
            drop(library);
            return Err(ExtensionError::load(name, reason));
        }

        let commands = ctx.into_commands();
        let declared: Vec<DeclaredCommand> = commands
            .iter()
            .map(|c| {
                DeclaredCommand::new(c.name.clone(), c.description.clone().unwrap_or_default())
                    .with_usage(c.usage.clone())
            })
            .collect();

        let bound = match self
            .descriptions
            .bind(&CommandOwner::Extension(name.to_string()), &declared)
        {
            Ok(bound) => bound,
            Err(e) => {
                error!("Extension '{}' could not register its commands: {}", name, e);
                drop(commands);
                drop(module);
                drop(library);
                return Err(ExtensionError::load(name, e));
            }
        };

        let mut table = CommandTable::new();
        for (bound_name, command) in bound.into_iter().zip(commands) {
            table.bind(bound_name, command);
        }

        info!("Loaded extension '{}' ({} commands)", name, table.len());
        entries.insert(
            name.to_string(),
            LoadedExtension {
                commands: table,
                module,
                library,
            },
        );
        Ok(true)
    }

    /// Unload `name` if it is loaded.
    ///
    /// Returns `true` when this call removed the extension. The entry is
    /// removed even if the teardown hook fails; the failure is still returned.
    pub fn ensure_unloaded(&self, name: &str) -> Result<bool, ExtensionError> {
        let Some(entry) = self.write().remove(name) else {
            return Ok(false);
        };

        let LoadedExtension {
            commands,
            mut module,
            library,
        } = entry;
        drop(commands);
        let result = module.teardown();
        drop(module);
        drop(library);

        match result {
            Ok(()) => {
                info!("Unloaded extension '{}'", name);
                Ok(true)
            }
            Err(reason) => {
                warn!("Extension '{}' teardown failed: {}", name, reason);
                Err(ExtensionError::unload(name, reason))
            }
        }
    }

    /// Unload then load `name`, picking up rewritten source or renamed commands.
    ///
    /// A teardown failure does not stop the load; it is returned if the load succeeds.
    pub fn reload(&self, name: &str) -> Result<(), ExtensionError> {
        let unloaded = self.ensure_unloaded(name);
        self.ensure_loaded(name)?;
        unloaded.map(|_| ())
    }

    fn instantiate(&self, name: &str) -> Result<LoadedModule, ExtensionError> {
        if let Some(factory) = self.builtins.get(name) {
            return Ok(LoadedModule::native(factory()));
        }

        let source = self
            .sources
            .read(name)
            .map_err(|e| ExtensionError::load(name, e))?;
        self.loader
            .instantiate(name, &source)
            .map_err(|reason| ExtensionError::load(name, reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Invocation, Message};
    use crate::extensions::general::{self, BASE_EXTENSION};
    use crate::infrastructure::extensions::{MemorySourceStore, UnitLoader};

    struct Broken;

    impl ExtensionModule for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn setup(&mut self, _ctx: &mut SetupContext) -> Result<(), String> {
            Err("missing API key".to_string())
        }
    }

    struct Sticky;

    impl ExtensionModule for Sticky {
        fn name(&self) -> &str {
            "sticky"
        }

        fn setup(&mut self, ctx: &mut SetupContext) -> Result<(), String> {
            ctx.register(Command::new("sticky").with_description("Sticks around"))
        }

        fn teardown(&mut self) -> Result<(), String> {
            Err("session still open".to_string())
        }
    }

    fn registry(sources: MemorySourceStore) -> ExtensionRegistry {
        ExtensionRegistry::new(
            Arc::new(sources),
            Arc::new(UnitLoader::new("/nonexistent")),
            Arc::new(CommandDescriptions::in_memory()),
        )
        .with_builtin(BASE_EXTENSION, general::create)
        .with_builtin("broken", || -> Box<dyn ExtensionModule> { Box::new(Broken) })
        .with_builtin("sticky", || -> Box<dyn ExtensionModule> { Box::new(Sticky) })
    }

    fn run(registry: &ExtensionRegistry, command: &str) -> Option<String> {
        let resolved = registry.resolve(command)?;
        let inv = Invocation::new(command, Message::from_command("c", command, vec![]));
        Some(resolved.command.execute(&inv).unwrap())
    }

    #[test]
    fn test_load_is_idempotent() {
        let registry = registry(MemorySourceStore::new().with_source("weather", "reply: Sunny"));

        assert!(registry.ensure_loaded("weather").unwrap());
        assert!(!registry.ensure_loaded("weather").unwrap());
        assert_eq!(registry.state("weather"), ExtensionState::Loaded);
        assert_eq!(run(&registry, "weather").as_deref(), Some("Sunny"));
        assert_eq!(registry.descriptions().lookup("weather").unwrap().owner,
            CommandOwner::Extension("weather".into()));
    }

    #[test]
    fn test_failed_setup_leaves_extension_unloaded() {
        let registry = registry(MemorySourceStore::new());

        let err = registry.ensure_loaded("broken").unwrap_err();
        assert!(matches!(err, ExtensionError::LoadFault { ref name, .. } if name == "broken"));
        assert_eq!(registry.state("broken"), ExtensionState::Unloaded);
    }

    #[test]
    fn test_missing_source_is_a_load_fault() {
        let registry = registry(MemorySourceStore::new());
        assert!(matches!(
            registry.ensure_loaded("ghost"),
            Err(ExtensionError::LoadFault { .. })
        ));
    }

    #[test]
    fn test_unload_removes_commands() {
        let registry = registry(MemorySourceStore::new().with_source("weather", "reply: Sunny"));
        registry.ensure_loaded("weather").unwrap();

        assert!(registry.ensure_unloaded("weather").unwrap());
        assert!(!registry.ensure_unloaded("weather").unwrap());
        assert!(registry.resolve("weather").is_none());
        // The description entry outlives the loaded module
        assert!(registry.descriptions().contains("weather"));
    }

    #[test]
    fn test_failed_teardown_still_unloads() {
        let registry = registry(MemorySourceStore::new());
        registry.ensure_loaded("sticky").unwrap();

        let err = registry.ensure_unloaded("sticky").unwrap_err();
        assert!(matches!(err, ExtensionError::UnloadFault { .. }));
        assert_eq!(registry.state("sticky"), ExtensionState::Unloaded);
        assert!(registry.ensure_loaded("sticky").unwrap());
    }

    #[test]
    fn test_reload_picks_up_renamed_command() {
        let registry = registry(MemorySourceStore::new());
        registry.ensure_loaded(BASE_EXTENSION).unwrap();
        assert!(run(&registry, "ping").unwrap().starts_with("Pong!"));

        registry.descriptions().rename("ping", "pong").unwrap();
        // Until reloaded, the live table still uses the old name
        assert!(registry.resolve("ping").is_some());

        registry.reload(BASE_EXTENSION).unwrap();
        assert!(registry.resolve("ping").is_none());
        assert!(run(&registry, "pong").unwrap().starts_with("Pong!"));
    }
}
