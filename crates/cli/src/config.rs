//! Configuration management for the CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_REGION: &str = "us-west-1";

/// CLI defaults, read from `~/.config/fleet/config.json`
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    pub region: Option<String>,
    /// SSH key name, resolved to `~/.ssh/<key>.pem`
    pub key: Option<String>,
    /// Directory holding the utilization series
    pub data_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, falling back to defaults if it is absent
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse config file")
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs_next::config_dir().context("Could not find config directory")?;
        Ok(config_dir.join("fleet").join("config.json"))
    }

    pub fn region_or_default(&self, flag: Option<String>) -> String {
        flag.or_else(|| self.region.clone())
            .unwrap_or_else(|| DEFAULT_REGION.to_string())
    }

    /// Data directory: flag, then config file, then the platform data dir
    pub fn data_dir_or_default(&self, flag: Option<PathBuf>) -> PathBuf {
        flag.or_else(|| self.data_dir.clone())
            .or_else(|| dirs_next::data_dir().map(|d| d.join("fleet")))
            .unwrap_or_else(|| PathBuf::from("data"))
    }

    /// Path of the SSH private key for `connect`
    pub fn key_path(&self, flag: Option<String>) -> Result<PathBuf> {
        let key = flag
            .or_else(|| self.key.clone())
            .context("No SSH key configured; pass --key or set \"key\" in the config file")?;
        let home = dirs_next::home_dir().context("Could not find home directory")?;
        Ok(home.join(".ssh").join(format!("{}.pem", key)))
    }
}
