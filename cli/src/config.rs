// Configuration management for the dhtinvite CLI
//
// Cross-platform config stored in:
// - macOS: ~/Library/Application Support/dhtinvite/config.json
// - Linux: ~/.config/dhtinvite/config.json
// - Windows: %APPDATA%\dhtinvite\config.json

use anyhow::{Context, Result};
use dhtinvite_core::InviteConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage path for identity and invite codes
    pub storage_path: Option<String>,

    /// Invite service settings
    pub invite: InviteConfig,
}

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("dhtinvite");

        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir)
    }

    /// Get the data directory path (cross-platform)
    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .context("Failed to determine data directory")?
            .join("dhtinvite");

        std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

        Ok(data_dir)
    }

    /// Get the config file path
    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load config from file, or create default if not exists
    pub fn load() -> Result<Self> {
        let config_file = Self::config_file()?;

        if config_file.exists() {
            Self::load_from(&config_file)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
        serde_json::from_str(&contents).context("Failed to parse config file")
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file()?)
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Where the sled database lives
    pub fn storage_dir(&self) -> Result<PathBuf> {
        match &self.storage_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => Ok(Self::data_dir()?.join("storage")),
        }
    }

    /// Set a config value
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.apply(key, value)?;
        self.save()
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        let invite = &mut self.invite;
        match key {
            "storage_path" => {
                self.storage_path = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            "server_namespace" => invite.server_namespace = value.to_string(),
            "client_namespace" => invite.client_namespace = value.to_string(),
            "transport_tag" => invite.transport_tag = value.to_string(),
            "follow_delay_ms" => {
                invite.follow_delay_ms = value.parse().context("Invalid number")?;
            }
            "retry.initial_delay_ms" => {
                invite.retry.initial_delay_ms = value.parse().context("Invalid number")?;
            }
            "retry.max_delay_ms" => {
                invite.retry.max_delay_ms = value.parse().context("Invalid number")?;
            }
            "retry.max_attempts" => {
                invite.retry.max_attempts = value.parse().context("Invalid number")?;
            }
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
        Ok(())
    }

    /// Get a config value
    pub fn get(&self, key: &str) -> Option<String> {
        self.list()
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// List all config values
    pub fn list(&self) -> Vec<(String, String)> {
        let invite = &self.invite;
        vec![
            (
                "storage_path".to_string(),
                self.storage_path.clone().unwrap_or_else(|| "(auto)".to_string()),
            ),
            ("server_namespace".to_string(), invite.server_namespace.clone()),
            ("client_namespace".to_string(), invite.client_namespace.clone()),
            ("transport_tag".to_string(), invite.transport_tag.clone()),
            ("follow_delay_ms".to_string(), invite.follow_delay_ms.to_string()),
            (
                "retry.initial_delay_ms".to_string(),
                invite.retry.initial_delay_ms.to_string(),
            ),
            (
                "retry.max_delay_ms".to_string(),
                invite.retry.max_delay_ms.to_string(),
            ),
            (
                "retry.max_attempts".to_string(),
                invite.retry.max_attempts.to_string(),
            ),
        ]
    }
}
