//! Command description map (`commands.json`)
//!
//! Every live command name appears exactly once, either under the extension
//! that owns it or in the flat `bot_commands` section. The map also records
//! which module command a renamed entry is bound to, so renames survive
//! extension reloads.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use crate::application::errors::{ExtensionError, StorageError};
use super::write_atomic;

/// Who owns a command
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommandOwner {
    /// Bot-level administrative command
    Bot,
    Extension(String),
}

impl CommandOwner {
    pub fn extension(&self) -> Option<&str> {
        match self {
            CommandOwner::Bot => None,
            CommandOwner::Extension(name) => Some(name),
        }
    }
}

impl fmt::Display for CommandOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandOwner::Bot => f.write_str("bot"),
            CommandOwner::Extension(name) => f.write_str(name),
        }
    }
}

/// Stored value for one command name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DescriptionEntry {
    /// Description of a command bound under its own identifier
    Plain(String),
    /// A command with a usage line, or bound under a different name than its identifier
    Detailed {
        description: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        handler: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<String>,
    },
}

impl DescriptionEntry {
    fn new(key: &str, handler: &str, description: impl Into<String>, usage: Option<String>) -> Self {
        let handler = (key != handler).then(|| handler.to_string());
        if handler.is_none() && usage.is_none() {
            DescriptionEntry::Plain(description.into())
        } else {
            DescriptionEntry::Detailed {
                description: description.into(),
                handler,
                usage,
            }
        }
    }

    pub fn description(&self) -> &str {
        match self {
            DescriptionEntry::Plain(d) => d,
            DescriptionEntry::Detailed { description, .. } => description,
        }
    }

    pub fn usage(&self) -> Option<&str> {
        match self {
            DescriptionEntry::Plain(_) => None,
            DescriptionEntry::Detailed { usage, .. } => usage.as_deref(),
        }
    }

    fn handler<'a>(&'a self, key: &'a str) -> &'a str {
        match self {
            DescriptionEntry::Detailed { handler: Some(handler), .. } => handler,
            _ => key,
        }
    }
}

/// A command as a module declares it when loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredCommand {
    /// Identifier inside the module
    pub handler: String,
    pub description: String,
    pub usage: Option<String>,
}

impl DeclaredCommand {
    pub fn new(handler: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            description: description.into(),
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: Option<String>) -> Self {
        self.usage = usage;
        self
    }
}

/// Resolved view of one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInfo {
    pub name: String,
    pub description: String,
    pub usage: Option<String>,
    pub owner: CommandOwner,
    /// Identifier of the module command this name is bound to
    pub handler: String,
}

type Section = BTreeMap<String, DescriptionEntry>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CommandMap {
    #[serde(default)]
    extensions: BTreeMap<String, Section>,
    #[serde(default)]
    bot_commands: Section,
}

impl CommandMap {
    fn section(&self, owner: &CommandOwner) -> Option<&Section> {
        match owner {
            CommandOwner::Bot => Some(&self.bot_commands),
            CommandOwner::Extension(name) => self.extensions.get(name),
        }
    }

    fn section_mut(&mut self, owner: &CommandOwner) -> &mut Section {
        match owner {
            CommandOwner::Bot => &mut self.bot_commands,
            CommandOwner::Extension(name) => self.extensions.entry(name.clone()).or_default(),
        }
    }

    fn find(&self, name: &str) -> Option<(CommandOwner, &DescriptionEntry)> {
        if let Some(entry) = self.bot_commands.get(name) {
            return Some((CommandOwner::Bot, entry));
        }
        self.extensions.iter().find_map(|(ext, section)| {
            section
                .get(name)
                .map(|entry| (CommandOwner::Extension(ext.clone()), entry))
        })
    }

    fn info(&self, name: &str) -> Option<CommandInfo> {
        self.find(name).map(|(owner, entry)| CommandInfo {
            name: name.to_string(),
            description: entry.description().to_string(),
            usage: entry.usage().map(str::to_string),
            handler: entry.handler(name).to_string(),
            owner,
        })
    }
}

/// Process-wide, persisted name → description map
pub struct CommandDescriptions {
    path: Option<PathBuf>,
    map: RwLock<CommandMap>,
}

impl CommandDescriptions {
    /// Open the map stored at `path`; a missing file starts empty
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let map = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).map_err(|e| StorageError::Corrupt {
                key: path.display().to_string(),
                reason: e.to_string(),
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => CommandMap::default(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path: Some(path),
            map: RwLock::new(map),
        })
    }

    /// A map that is never written to disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            map: RwLock::new(CommandMap::default()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn lookup(&self, name: &str) -> Option<CommandInfo> {
        self.map.read().unwrap_or_else(PoisonError::into_inner).info(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .find(name)
            .is_some()
    }

    /// Decide the live name of each declared command for `owner`.
    ///
    /// An identifier already bound in the owner's section keeps its bound
    /// name, and its description and usage are refreshed from the
    /// declaration. New identifiers are recorded under their own name,
    /// failing with `NameConflict` if another owner already uses it.
    /// Nothing is changed when any identifier conflicts.
    pub fn bind(
        &self,
        owner: &CommandOwner,
        declared: &[DeclaredCommand],
    ) -> Result<Vec<String>, ExtensionError> {
        let mut map = self.map.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = map.clone();
        let mut bound = Vec::with_capacity(declared.len());
        let mut changed = false;

        for command in declared {
            let handler = command.handler.as_str();
            let existing = next.section(owner).and_then(|section| {
                section
                    .iter()
                    .find(|(key, entry)| entry.handler(key) == handler)
                    .map(|(key, entry)| (key.clone(), entry.clone()))
            });

            let key = match existing {
                Some((key, entry)) => {
                    if entry.description() == command.description && entry.usage() == command.usage.as_deref() {
                        bound.push(key);
                        continue;
                    }
                    key
                }
                None => {
                    if next.find(handler).is_some() {
                        return Err(ExtensionError::NameConflict(handler.to_string()));
                    }
                    handler.to_string()
                }
            };

            next.section_mut(owner).insert(
                key.clone(),
                DescriptionEntry::new(&key, handler, command.description.clone(), command.usage.clone()),
            );
            bound.push(key);
            changed = true;
        }

        if changed {
            self.persist(&next)?;
            *map = next;
        }
        Ok(bound)
    }

    /// Move `old` to `new` within its owner's section, keeping its description
    /// and binding. Check, mutation and write happen under one lock.
    pub fn rename(&self, old: &str, new: &str) -> Result<CommandInfo, ExtensionError> {
        let mut map = self.map.write().unwrap_or_else(PoisonError::into_inner);

        let info = map
            .info(old)
            .ok_or_else(|| ExtensionError::CommandNotFound(old.to_string()))?;
        if map.find(new).is_some() {
            return Err(ExtensionError::NameConflict(new.to_string()));
        }

        let mut next = map.clone();
        let section = next.section_mut(&info.owner);
        section.remove(old);
        section.insert(
            new.to_string(),
            DescriptionEntry::new(new, &info.handler, info.description.clone(), info.usage.clone()),
        );

        self.persist(&next)?;
        *map = next;

        Ok(CommandInfo {
            name: new.to_string(),
            ..info
        })
    }

    /// All commands grouped by owner: bot commands first, then extensions by name
    pub fn sections(&self) -> Vec<(CommandOwner, Vec<CommandInfo>)> {
        let map = self.map.read().unwrap_or_else(PoisonError::into_inner);
        let flatten = |owner: &CommandOwner, section: &Section| {
            section
                .iter()
                .map(|(key, entry)| CommandInfo {
                    name: key.clone(),
                    description: entry.description().to_string(),
                    usage: entry.usage().map(str::to_string),
                    owner: owner.clone(),
                    handler: entry.handler(key).to_string(),
                })
                .collect::<Vec<_>>()
        };

        let mut out = vec![(CommandOwner::Bot, flatten(&CommandOwner::Bot, &map.bot_commands))];
        for (ext, section) in &map.extensions {
            let owner = CommandOwner::Extension(ext.clone());
            let commands = flatten(&owner, section);
            out.push((owner, commands));
        }
        out
    }

    fn persist(&self, map: &CommandMap) -> Result<(), StorageError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(map)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        write_atomic(path, &json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn general() -> CommandOwner {
        CommandOwner::Extension("general".to_string())
    }

    fn declared(items: &[(&str, &str)]) -> Vec<DeclaredCommand> {
        items.iter().map(|(id, desc)| DeclaredCommand::new(*id, *desc)).collect()
    }

    #[test]
    fn test_bind_records_new_commands() {
        let map = CommandDescriptions::in_memory();
        let bound = map
            .bind(&general(), &declared(&[("ping", "Check latency"), ("info", "Bot info")]))
            .unwrap();
        assert_eq!(bound, vec!["ping", "info"]);

        let info = map.lookup("ping").unwrap();
        assert_eq!(info.owner, general());
        assert_eq!(info.description, "Check latency");
    }

    #[test]
    fn test_bind_rejects_names_owned_elsewhere() {
        let map = CommandDescriptions::in_memory();
        map.bind(&CommandOwner::Bot, &declared(&[("enable", "Enable")])).unwrap();

        let err = map
            .bind(&general(), &declared(&[("ping", "p"), ("enable", "clash")]))
            .unwrap_err();
        assert!(matches!(err, ExtensionError::NameConflict(ref n) if n == "enable"));
        // Nothing from the failed batch was recorded
        assert!(!map.contains("ping"));
    }

    #[test]
    fn test_rename_survives_rebind() {
        let map = CommandDescriptions::in_memory();
        map.bind(&general(), &declared(&[("ping", "Check latency")])).unwrap();

        let renamed = map.rename("ping", "pong").unwrap();
        assert_eq!(renamed.handler, "ping");
        assert!(!map.contains("ping"));
        assert_eq!(map.lookup("pong").unwrap().description, "Check latency");

        // Reloading the module binds its `ping` identifier under the new name
        let bound = map.bind(&general(), &declared(&[("ping", "Check latency")])).unwrap();
        assert_eq!(bound, vec!["pong"]);
        assert!(!map.contains("ping"));
    }

    #[test]
    fn test_rename_failures_leave_map_untouched() {
        let map = CommandDescriptions::in_memory();
        map.bind(&general(), &declared(&[("ping", "p"), ("info", "i")])).unwrap();

        assert!(matches!(map.rename("nope", "x"), Err(ExtensionError::CommandNotFound(_))));
        assert!(matches!(map.rename("ping", "info"), Err(ExtensionError::NameConflict(_))));
        assert!(map.contains("ping"));
        assert_eq!(map.lookup("info").unwrap().handler, "info");
    }

    #[test]
    fn test_persisted_layout_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commands.json");

        let map = CommandDescriptions::open(&path).unwrap();
        map.bind(&CommandOwner::Bot, &declared(&[("rename", "Rename a command")])).unwrap();
        map.bind(&general(), &declared(&[("ping", "Check latency")])).unwrap();
        map.rename("ping", "pong").unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["bot_commands"]["rename"], "Rename a command");
        assert_eq!(raw["extensions"]["general"]["pong"]["handler"], "ping");

        let reopened = CommandDescriptions::open(&path).unwrap();
        assert_eq!(reopened.lookup("pong").unwrap().handler, "ping");
    }

    #[test]
    fn test_rebind_refreshes_description_and_keeps_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commands.json");
        let map = CommandDescriptions::open(&path).unwrap();
        let owner = CommandOwner::Extension("weather".to_string());

        map.bind(&owner, &declared(&[("weather", "Old text")])).unwrap();
        let bound = map
            .bind(&owner, &[DeclaredCommand::new("weather", "New text").with_usage(Some("weather <city>".into()))])
            .unwrap();
        assert_eq!(bound, vec!["weather"]);

        let reopened = CommandDescriptions::open(&path).unwrap();
        let info = reopened.lookup("weather").unwrap();
        assert_eq!(info.description, "New text");
        assert_eq!(info.usage.as_deref(), Some("weather <city>"));
    }

    #[test]
    fn test_renamed_entry_keeps_binding_when_description_changes() {
        let map = CommandDescriptions::in_memory();
        map.bind(&general(), &declared(&[("ping", "Check latency")])).unwrap();
        map.rename("ping", "pong").unwrap();

        let bound = map.bind(&general(), &declared(&[("ping", "Measure latency")])).unwrap();
        assert_eq!(bound, vec!["pong"]);
        let info = map.lookup("pong").unwrap();
        assert_eq!(info.handler, "ping");
        assert_eq!(info.description, "Measure latency");
        assert!(!map.contains("ping"));
    }

    #[test]
    fn test_sections_carry_usage() {
        let map = CommandDescriptions::in_memory();
        map.bind(&general(), &[DeclaredCommand::new("ping", "p").with_usage(Some("ping".into()))]).unwrap();

        let sections = map.sections();
        assert_eq!(sections[0].0, CommandOwner::Bot);
        let (owner, commands) = &sections[1];
        assert_eq!(owner, &general());
        assert_eq!(commands[0].usage.as_deref(), Some("ping"));
    }
}
