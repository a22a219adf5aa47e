//! Bot-level administrative commands
//!
//! These are owned by the bot rather than any extension and live in the
//! `bot_commands` section of the description map.

use std::sync::Arc;
use tracing::info;

use crate::application::errors::{BotError, ErrorKind, ExtensionError};
use crate::domain::entities::{Message, User};
use crate::infrastructure::storage::{CommandDescriptions, CommandOwner, DeclaredCommand};
use super::lifecycle::LifecycleCoordinator;

/// Handler identifiers and descriptions of the bot commands
pub const BOT_COMMANDS: &[(&str, &str)] = &[
    ("enable", "Enable an extension for this server (admin)."),
    ("disable", "Disable an extension for this server (admin)."),
    ("add_extension", "Upload or replace an extension's source (admin)."),
    ("rename", "Rename a command (admin)."),
    ("reload", "Reload an extension (admin)."),
    ("extensions", "List this server's extensions and their state (admin)."),
];

/// Runs the bot commands against the lifecycle coordinator
pub struct AdminCommands {
    coordinator: Arc<LifecycleCoordinator>,
    admins: Vec<String>,
}

impl AdminCommands {
    pub fn new(coordinator: Arc<LifecycleCoordinator>, admins: Vec<String>) -> Self {
        Self { coordinator, admins }
    }

    /// Record the bot commands in the description map, returning their live names
    pub fn register(descriptions: &CommandDescriptions) -> Result<Vec<String>, ExtensionError> {
        let declared: Vec<DeclaredCommand> = BOT_COMMANDS
            .iter()
            .map(|(id, desc)| DeclaredCommand::new(*id, *desc))
            .collect();
        descriptions.bind(&CommandOwner::Bot, &declared)
    }

    pub fn coordinator(&self) -> &Arc<LifecycleCoordinator> {
        &self.coordinator
    }

    pub fn is_admin(&self, user_id: &str) -> bool {
        self.admins.is_empty() || self.admins.iter().any(|id| id == user_id)
    }

    /// Run the bot command bound to `handler`, invoked as `invoked_as`.
    ///
    /// Lifecycle failures caused by the caller's input become the reply;
    /// storage failures are returned as errors.
    pub async fn handle(&self, handler: &str, invoked_as: &str, message: &Message) -> Result<String, BotError> {
        let sender = message
            .sender
            .as_ref()
            .ok_or_else(|| BotError::PermissionDenied("anonymous sender".to_string()))?;
        if !self.is_admin(&sender.id) {
            return Err(BotError::PermissionDenied(format!(
                "{} is not allowed to run {}",
                sender, invoked_as
            )));
        }

        info!("{} ran admin command {} ({})", sender, invoked_as, handler);
        let result = match handler {
            "enable" => self.enable(invoked_as, message),
            "disable" => self.disable(invoked_as, message),
            "add_extension" => self.add_extension(invoked_as, sender, message).await,
            "rename" => self.rename(invoked_as, message),
            "reload" => self.reload(invoked_as, message),
            "extensions" => self.extensions(message),
            other => return Err(BotError::Internal(format!("no bot command bound to '{}'", other))),
        };

        match result {
            Ok(reply) => Ok(reply),
            Err(e) if e.kind() == ErrorKind::Persistence => Err(e.into()),
            Err(e) => Ok(e.to_string()),
        }
    }

    fn enable(&self, invoked_as: &str, message: &Message) -> Result<String, ExtensionError> {
        let Some(server_id) = message.server_id.as_deref() else {
            return Ok(server_only(invoked_as));
        };
        let Some(name) = message.args().first() else {
            return Ok(usage(invoked_as, "<extension>"));
        };

        let outcome = self.coordinator.enable(server_id, name)?;
        Ok(match outcome.load {
            Ok(()) => format!("Enabled extension '{}'.", outcome.name),
            Err(e) => format!("Enabled extension '{}', but it is not active: {}", outcome.name, e),
        })
    }

    fn disable(&self, invoked_as: &str, message: &Message) -> Result<String, ExtensionError> {
        let Some(server_id) = message.server_id.as_deref() else {
            return Ok(server_only(invoked_as));
        };
        let Some(name) = message.args().first() else {
            return Ok(usage(invoked_as, "<extension>"));
        };

        let outcome = self.coordinator.disable(server_id, name)?;
        Ok(match outcome.unload {
            Some(Err(e)) => format!("Disabled extension '{}'. {}", outcome.name, e),
            _ if outcome.still_referenced => format!(
                "Disabled extension '{}'. Other servers still use it, so it stays loaded.",
                outcome.name
            ),
            _ => format!("Disabled extension '{}'.", outcome.name),
        })
    }

    async fn add_extension(&self, invoked_as: &str, sender: &User, message: &Message) -> Result<String, ExtensionError> {
        let Some(name) = message.args().first() else {
            return Ok(usage(invoked_as, "<extension>"));
        };

        let outcome = self.coordinator.add_extension(sender, name).await?;
        let mut reply = if outcome.created {
            format!("Added extension '{}'.", outcome.name)
        } else {
            format!("Replaced the source of extension '{}'.", outcome.name)
        };
        if outcome.unloaded {
            reply.push_str(" It was unloaded and loads again on next use by a server that enables it.");
        } else {
            reply.push_str(" Enable it to start using it.");
        }
        Ok(reply)
    }

    fn rename(&self, invoked_as: &str, message: &Message) -> Result<String, ExtensionError> {
        let [old, new] = message.args() else {
            return Ok(usage(invoked_as, "<command> <new-name>"));
        };

        let outcome = self.coordinator.rename(old, new)?;
        Ok(match outcome.reload {
            Some(Err(e)) => format!(
                "Renamed '{}' to '{}', but reloading '{}' failed: {}",
                outcome.old, outcome.new, outcome.owner, e
            ),
            _ => format!("Renamed '{}' to '{}'.", outcome.old, outcome.new),
        })
    }

    fn reload(&self, invoked_as: &str, message: &Message) -> Result<String, ExtensionError> {
        let Some(name) = message.args().first() else {
            return Ok(usage(invoked_as, "<extension>"));
        };

        self.coordinator.reload(name)?;
        Ok(format!("Reloaded extension '{}'.", name))
    }

    fn extensions(&self, message: &Message) -> Result<String, ExtensionError> {
        let Some(server_id) = message.server_id.as_deref() else {
            let loaded = self.coordinator.registry().loaded_names();
            return Ok(format!("Loaded extensions: {}", loaded.join(", ")));
        };

        let mut out = format!("Extensions for server {}:\n", server_id);
        for status in self.coordinator.status(server_id)? {
            let enabled = if status.name == self.coordinator.base() {
                "base"
            } else if status.enabled {
                "enabled"
            } else {
                "available"
            };
            let missing = if status.available { "" } else { ", source missing" };
            out.push_str(&format!("  {} [{}, {}{}]\n", status.name, enabled, status.state, missing));
        }
        Ok(out)
    }
}

fn usage(invoked_as: &str, args: &str) -> String {
    format!("Usage: {} {}", invoked_as, args)
}

fn server_only(invoked_as: &str) -> String {
    format!("{} can only be used in a server.", invoked_as)
}
