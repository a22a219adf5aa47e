//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use crate::application::errors::ConfigError;

/// Bot configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub bot: BotConfig,
    pub extensions: ExtensionsConfig,
    pub storage: StorageConfig,
    pub security: SecurityConfig,
    pub adapters: AdaptersConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BotConfig {
    pub name: String,
    pub prefix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExtensionsConfig {
    /// Holds `<name>.yaml` source units and the libraries they reference
    pub directory: PathBuf,
    pub collect_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Json,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub servers_dir: PathBuf,
    pub sqlite_path: PathBuf,
    pub commands_file: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SecurityConfig {
    pub rate_limit: RateLimitConfig,
    /// User ids allowed to run admin commands; empty allows everyone
    #[serde(default)]
    pub admins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AdaptersConfig {
    pub console: Option<ConsoleConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConsoleConfig {
    pub enabled: bool,
    /// Server the console starts in; `None` starts in direct messages
    pub server_id: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot: BotConfig {
                name: "odin-bot".to_string(),
                prefix: "!".to_string(),
                token: None,
            },
            extensions: ExtensionsConfig {
                directory: PathBuf::from("./extensions"),
                collect_timeout_secs: 300,
            },
            storage: StorageConfig {
                backend: StorageBackend::Json,
                servers_dir: PathBuf::from("./data/servers"),
                sqlite_path: PathBuf::from("./data/odin.db"),
                commands_file: PathBuf::from("./data/commands.json"),
            },
            security: SecurityConfig {
                rate_limit: RateLimitConfig {
                    max_requests: 20,
                    window_seconds: 60,
                },
                admins: Vec::new(),
            },
            adapters: AdaptersConfig {
                console: Some(ConsoleConfig {
                    enabled: true,
                    server_id: Some("console".to_string()),
                }),
            },
        }
    }
}

impl Config {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Parse(format!("Failed to read config: {}", e)))?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self)
            .map_err(|e| ConfigError::Parse(format!("Failed to serialize config: {}", e)))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.bot.prefix.trim().is_empty() {
            return Err(ConfigError::InvalidValue("bot.prefix must not be empty".to_string()));
        }
        if self.extensions.collect_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "extensions.collect-timeout-secs must be positive".to_string(),
            ));
        }
        if self.security.rate_limit.max_requests == 0 {
            return Err(ConfigError::InvalidValue(
                "security.rate-limit.max-requests must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Check if a user may run admin commands
    pub fn is_admin(&self, user_id: &str) -> bool {
        if self.security.admins.is_empty() {
            return true; // No allow-list, everyone is an admin
        }
        self.security.admins.iter().any(|id| id == user_id)
    }

    pub fn collect_timeout(&self) -> Duration {
        Duration::from_secs(self.extensions.collect_timeout_secs)
    }

    pub fn load_env() -> Self {
        // Load from environment variables
        let mut config = Config::default();

        if let Ok(token) = std::env::var("BOT_TOKEN") {
            config.bot.token = Some(token);
        }

        if let Ok(prefix) = std::env::var("BOT_PREFIX") {
            if !prefix.trim().is_empty() {
                config.bot.prefix = prefix;
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_round_trips_through_yaml() {
        let yaml = Config::default().to_yaml().unwrap();
        assert!(yaml.contains("collect-timeout-secs: 300"));
        assert!(yaml.contains("backend: json"));

        let config = Config::from_yaml(&yaml).unwrap();
        assert_eq!(config.bot.prefix, "!");
        assert_eq!(config.collect_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = Config::from_yaml(
            "storage:\n  backend: sqlite\n  servers-dir: s\n  sqlite-path: db.sqlite\n  commands-file: c.json\n",
        )
        .unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.bot.name, "odin-bot");
        assert_eq!(config.extensions.directory, PathBuf::from("./extensions"));
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(Config::from_yaml("bot: { name: x, prefix: ' ' }").is_err());
        assert!(Config::from_yaml("extensions: { directory: x, collect-timeout-secs: 0 }").is_err());
        assert!(Config::from_yaml("storage: { backend: redis }").is_err());
    }

    #[test]
    fn test_admin_allow_list() {
        let mut config = Config::default();
        assert!(config.is_admin("anyone"));

        config.security.admins = vec!["1".to_string()];
        assert!(config.is_admin("1"));
        assert!(!config.is_admin("2"));
    }
}
