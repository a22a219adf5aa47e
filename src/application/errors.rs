//! Application layer errors

use std::time::Duration;
use thiserror::Error;

/// General bot errors
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    #[error("Extension error: {0}")]
    Extension(#[from] ExtensionError),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Command execution errors
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("{0}")]
    InvalidArgs(String),

    #[error("Command {0} has no handler")]
    NotImplemented(String),
}

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corrupt record '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Database(e.to_string())
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Interactive reply collection errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollectError {
    #[error("Timed out after {0:?} waiting for a reply")]
    TimedOut(Duration),

    #[error("Could not reach the user: {0}")]
    Unavailable(String),

    #[error("Conversation was cancelled")]
    Cancelled,
}

/// Coarse classification of [`ExtensionError`]s
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Persistence,
    Module,
    Interaction,
}

/// Extension lifecycle errors
///
/// None of these are retried; each is terminal for the operation that raised it.
#[derive(Error, Debug)]
pub enum ExtensionError {
    #[error("Invalid name '{0}': only letters, numbers, underscores or hyphens are allowed")]
    InvalidName(String),

    #[error("Extension '{0}' is protected and cannot be changed")]
    ProtectedExtension(String),

    #[error("Command name must match the extension name '{extension}' (got '{command}')")]
    NamingConstraintViolated { command: String, extension: String },

    #[error("Invalid source for '{name}': {reason}")]
    InvalidSource { name: String, reason: String },

    #[error("Extension '{0}' not found")]
    NotFound(String),

    #[error("Command '{0}' not found")]
    CommandNotFound(String),

    #[error("Extension '{0}' is already enabled")]
    AlreadyEnabled(String),

    #[error("Extension '{0}' is not enabled")]
    NotEnabled(String),

    #[error("Command '{0}' already exists")]
    NameConflict(String),

    #[error("A conversation with user '{0}' is already in progress")]
    CollectionPending(String),

    #[error("{0}")]
    Collect(#[from] CollectError),

    #[error("Storage error: {0}")]
    Persistence(#[from] StorageError),

    #[error("Failed to load extension '{name}': {reason}")]
    LoadFault { name: String, reason: String },

    #[error("Failed to unload extension '{name}': {reason}")]
    UnloadFault { name: String, reason: String },
}

impl ExtensionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtensionError::InvalidName(_)
            | ExtensionError::ProtectedExtension(_)
            | ExtensionError::NamingConstraintViolated { .. }
            | ExtensionError::InvalidSource { .. } => ErrorKind::Validation,
            ExtensionError::NotFound(_)
            | ExtensionError::CommandNotFound(_)
            | ExtensionError::NotEnabled(_) => ErrorKind::NotFound,
            ExtensionError::AlreadyEnabled(_)
            | ExtensionError::NameConflict(_)
            | ExtensionError::CollectionPending(_) => ErrorKind::Conflict,
            ExtensionError::Persistence(_) => ErrorKind::Persistence,
            ExtensionError::LoadFault { .. } | ExtensionError::UnloadFault { .. } => ErrorKind::Module,
            ExtensionError::Collect(_) => ErrorKind::Interaction,
        }
    }

    pub fn load(name: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        ExtensionError::LoadFault {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn unload(name: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        ExtensionError::UnloadFault {
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(ExtensionError::InvalidName(".x".into()).kind(), ErrorKind::Validation);
        assert_eq!(ExtensionError::NotEnabled("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(ExtensionError::AlreadyEnabled("x".into()).kind(), ErrorKind::Conflict);
        assert_eq!(ExtensionError::load("x", "boom").kind(), ErrorKind::Module);
        assert_eq!(
            ExtensionError::from(CollectError::Cancelled).kind(),
            ErrorKind::Interaction
        );
        let corrupt = StorageError::Corrupt { key: "42".into(), reason: "eof".into() };
        assert_eq!(ExtensionError::from(corrupt).kind(), ErrorKind::Persistence);
    }

    #[test]
    fn test_load_fault_message_names_extension() {
        let err = ExtensionError::load("weather", "missing library");
        assert_eq!(err.to_string(), "Failed to load extension 'weather': missing library");
    }
}
