//! Lifecycle coordinator - keeps the extension registry in line with server records

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::application::errors::{CollectError, ExtensionError};
use crate::domain::entities::{is_valid_name, ExtensionState, ServerRecord, User};
use crate::domain::traits::{ReplyCollector, SourceStore};
use crate::extensions::{ExtensionRegistry, BASE_EXTENSION};
use crate::infrastructure::storage::CommandOwner;
use super::server_configs::ServerConfigs;

/// Tunables for the coordinator
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    /// Extension loaded for every server; never stored, never disableable
    pub base: String,
    /// How long to wait for interactively supplied source
    pub collect_timeout: Duration,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            base: BASE_EXTENSION.to_string(),
            collect_timeout: Duration::from_secs(300),
        }
    }
}

/// Result of one reconciliation pass
#[derive(Debug)]
pub struct ReconcileReport {
    pub server_id: String,
    /// The server's record; empty if it could not be read
    pub enabled: ServerRecord,
    /// Extensions this pass had to load
    pub loaded: Vec<String>,
    pub failures: Vec<ExtensionError>,
    /// `true` when the record was unreadable and treated as empty
    pub degraded: bool,
}

#[derive(Debug)]
pub struct EnableOutcome {
    pub name: String,
    pub record: ServerRecord,
    /// The load step, reported apart from the persisted enable
    pub load: Result<(), ExtensionError>,
}

#[derive(Debug)]
pub struct DisableOutcome {
    pub name: String,
    pub record: ServerRecord,
    /// Another server still has the extension enabled, so it stays loaded
    pub still_referenced: bool,
    /// The unload step, when one was attempted
    pub unload: Option<Result<(), ExtensionError>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddOutcome {
    pub name: String,
    /// No source existed before this call
    pub created: bool,
    /// The extension was loaded and had to be unloaded before the write
    pub unloaded: bool,
}

#[derive(Debug)]
pub struct RenameOutcome {
    pub old: String,
    pub new: String,
    pub owner: CommandOwner,
    /// Reload of the owning extension, when it was loaded
    pub reload: Option<Result<(), ExtensionError>>,
}

/// One row of a server's extension listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionStatus {
    pub name: String,
    pub enabled: bool,
    pub state: ExtensionState,
    pub available: bool,
}

/// Removes a user from the pending-collection set when dropped
struct PendingCollection<'a> {
    pending: &'a Mutex<HashSet<String>>,
    user_id: String,
}

impl Drop for PendingCollection<'_> {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.user_id);
    }
}

/// Orchestrates the registry, server records and source store.
///
/// Enable and disable are serialized by one admin lock so the
/// read-modify-write of a record and the reference scan that follows a
/// disable cannot interleave with another admin operation.
pub struct LifecycleCoordinator {
    registry: Arc<ExtensionRegistry>,
    configs: ServerConfigs,
    sources: Arc<dyn SourceStore>,
    collector: Arc<dyn ReplyCollector>,
    settings: LifecycleSettings,
    admin_lock: Mutex<()>,
    collecting: Mutex<HashSet<String>>,
}

fn validate(name: &str) -> Result<(), ExtensionError> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(ExtensionError::InvalidName(name.to_string()))
    }
}

impl LifecycleCoordinator {
    pub fn new(
        registry: Arc<ExtensionRegistry>,
        configs: ServerConfigs,
        sources: Arc<dyn SourceStore>,
        collector: Arc<dyn ReplyCollector>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            registry,
            configs,
            sources,
            collector,
            settings,
            admin_lock: Mutex::new(()),
            collecting: Mutex::new(HashSet::new()),
        }
    }

    pub fn registry(&self) -> &Arc<ExtensionRegistry> {
        &self.registry
    }

    pub fn configs(&self) -> &ServerConfigs {
        &self.configs
    }

    pub fn base(&self) -> &str {
        &self.settings.base
    }

    fn is_base(&self, name: &str) -> bool {
        name == self.settings.base
    }

    fn admin_lock(&self) -> MutexGuard<'_, ()> {
        self.admin_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load the base extension; called once at process start
    pub fn start(&self) -> Result<(), ExtensionError> {
        self.registry.ensure_loaded(&self.settings.base)?;
        info!("Base extension '{}' loaded", self.settings.base);
        Ok(())
    }

    /// Ensure the base extension and everything `server_id` enabled are loaded.
    ///
    /// Never fails: an unreadable record is treated as empty and load
    /// failures are collected into the report.
    pub fn reconcile(&self, server_id: &str) -> ReconcileReport {
        let mut failures = Vec::new();

        if let Err(e) = self.registry.ensure_loaded(&self.settings.base) {
            error!("Base extension unavailable: {}", e);
            failures.push(e);
        }

        let (enabled, degraded) = match self.configs.get(server_id) {
            Ok(record) => (record, false),
            Err(e) => {
                warn!("Treating server {} as having no extensions: {}", server_id, e);
                (ServerRecord::new(), true)
            }
        };

        let mut loaded = Vec::new();
        for name in enabled.iter() {
            if self.registry.is_loaded(name) {
                continue;
            }
            match self.registry.ensure_loaded(name) {
                Ok(true) => loaded.push(name.to_string()),
                Ok(false) => {}
                Err(e) => {
                    error!("Server {}: {}", server_id, e);
                    failures.push(e);
                }
            }
        }

        ReconcileReport {
            server_id: server_id.to_string(),
            enabled,
            loaded,
            failures,
            degraded,
        }
    }

    /// Persist `name` as enabled for the server, then load it.
    ///
    /// A failed load does not undo the enable; the next reconciliation
    /// retries it.
    pub fn enable(&self, server_id: &str, name: &str) -> Result<EnableOutcome, ExtensionError> {
        validate(name)?;
        if self.is_base(name) {
            return Err(ExtensionError::AlreadyEnabled(name.to_string()));
        }
        if !self.sources.exists(name) {
            return Err(ExtensionError::NotFound(name.to_string()));
        }

        let _guard = self.admin_lock();
        let record = self.configs.enable(server_id, name)?;
        info!("Enabled extension '{}' for server {}", name, server_id);

        let load = self.registry.ensure_loaded(name).map(|_| ());
        if let Err(e) = &load {
            warn!("Extension '{}' enabled for server {} but not active: {}", name, server_id, e);
        }

        Ok(EnableOutcome {
            name: name.to_string(),
            record,
            load,
        })
    }

    /// Remove `name` from the server's record and unload it if no server still uses it
    pub fn disable(&self, server_id: &str, name: &str) -> Result<DisableOutcome, ExtensionError> {
        validate(name)?;
        if self.is_base(name) {
            return Err(ExtensionError::ProtectedExtension(name.to_string()));
        }

        let _guard = self.admin_lock();
        let record = self.configs.disable(server_id, name)?;
        info!("Disabled extension '{}' for server {}", name, server_id);

        let still_referenced = self.configs.is_referenced(name);
        let unload = if still_referenced {
            None
        } else {
            let result = self.registry.ensure_unloaded(name).map(|_| ());
            if let Err(e) = &result {
                warn!("{}", e);
            }
            Some(result)
        };

        Ok(DisableOutcome {
            name: name.to_string(),
            record,
            still_referenced,
            unload,
        })
    }

    fn begin_collection(&self, user_id: &str) -> Result<PendingCollection<'_>, ExtensionError> {
        let mut pending = self.collecting.lock().unwrap_or_else(PoisonError::into_inner);
        if !pending.insert(user_id.to_string()) {
            return Err(ExtensionError::CollectionPending(user_id.to_string()));
        }
        Ok(PendingCollection {
            pending: &self.collecting,
            user_id: user_id.to_string(),
        })
    }

    /// Ask `user` for the source of `name` and write it to the source store.
    ///
    /// The new source is not loaded; enabling it is a separate step. If `name`
    /// is loaded it is unloaded before the write. On timeout or invalid
    /// source nothing is written or unloaded.
    pub async fn add_extension(&self, user: &User, name: &str) -> Result<AddOutcome, ExtensionError> {
        validate(name)?;
        if self.is_base(name) || self.registry.is_builtin(name) {
            return Err(ExtensionError::ProtectedExtension(name.to_string()));
        }

        let _pending = self.begin_collection(&user.id)?;
        let prompt = format!(
            "Send the source for extension `{}` as your next message, e.g. `reply: <text>` \
             for a scripted command or `library: <file>` for a native one.",
            name
        );

        let timeout = self.settings.collect_timeout;
        let source = match tokio::time::timeout(timeout, self.collector.collect(user, &prompt)).await {
            Ok(reply) => reply?,
            Err(_) => {
                info!("Timed out waiting for source of '{}' from {}", name, user);
                return Err(CollectError::TimedOut(timeout).into());
            }
        };

        self.registry.validate_source(name, &source)?;

        let created = !self.sources.exists(name);
        let unloaded = self.registry.is_loaded(name);
        if unloaded {
            if let Err(e) = self.registry.ensure_unloaded(name) {
                warn!("{}", e);
            }
        }

        self.sources.write(name, &source)?;
        info!(
            "Wrote source for extension '{}' from {} ({})",
            name,
            user,
            if created { "new" } else { "replaced" }
        );

        Ok(AddOutcome {
            name: name.to_string(),
            created,
            unloaded,
        })
    }

    /// Rename a command in the description map, reloading its owner if loaded.
    ///
    /// A failed reload is reported but the rename stands.
    pub fn rename(&self, old: &str, new: &str) -> Result<RenameOutcome, ExtensionError> {
        validate(new)?;
        let descriptions = self.registry.descriptions();

        let info = descriptions
            .lookup(old)
            .ok_or_else(|| ExtensionError::CommandNotFound(old.to_string()))?;
        if descriptions.contains(new) {
            return Err(ExtensionError::NameConflict(new.to_string()));
        }
        if let Some(owner) = info.owner.extension() {
            if !self.is_base(owner) && new != owner {
                return Err(ExtensionError::NamingConstraintViolated {
                    command: new.to_string(),
                    extension: owner.to_string(),
                });
            }
        }

        descriptions.rename(old, new)?;
        info!("Renamed command '{}' to '{}' (owner: {})", old, new, info.owner);

        let reload = match info.owner.extension() {
            Some(owner) if self.registry.is_loaded(owner) => {
                let result = self.registry.reload(owner);
                if let Err(e) = &result {
                    error!("Failed to reload '{}' after rename: {}", owner, e);
                }
                Some(result)
            }
            _ => None,
        };

        Ok(RenameOutcome {
            old: old.to_string(),
            new: new.to_string(),
            owner: info.owner,
            reload,
        })
    }

    /// Reload a loaded extension on request. Never loads one that is not in use.
    pub fn reload(&self, name: &str) -> Result<(), ExtensionError> {
        validate(name)?;
        if !self.registry.is_builtin(name) && !self.sources.exists(name) {
            return Err(ExtensionError::NotFound(name.to_string()));
        }

        let _guard = self.admin_lock();
        if !self.registry.is_loaded(name) {
            return Err(ExtensionError::NotEnabled(name.to_string()));
        }
        self.registry.reload(name)?;
        info!("Reloaded extension '{}'", name);
        Ok(())
    }

    /// The base extension, the server's enabled extensions, then every other stored source
    pub fn status(&self, server_id: &str) -> Result<Vec<ExtensionStatus>, ExtensionError> {
        let record = self.configs.get(server_id)?;

        let mut names = vec![self.settings.base.clone()];
        names.extend(record.iter().map(str::to_string));
        for name in self.sources.names()? {
            if !names.contains(&name) {
                names.push(name);
            }
        }

        Ok(names
            .into_iter()
            .map(|name| ExtensionStatus {
                enabled: self.is_base(&name) || record.contains(&name),
                state: self.registry.state(&name),
                available: self.registry.is_builtin(&name) || self.sources.exists(&name),
                name,
            })
            .collect())
    }
}
