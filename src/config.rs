// Configuration for heaper
//
// Settings can come from a JSON file; command line flags override them.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use common::NAME_LIMIT;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::table::Mode;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("name limit must be between 1 and {max}, got {got}")]
    NameLimit { got: usize, max: usize },
}

/// Session settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Table rendition to run
    pub mode: Mode,

    /// Longest accepted name in hardened mode
    pub name_limit: usize,

    /// File revealed by the hidden handler
    pub secret_path: PathBuf,

    /// Where to write the session trace, if anywhere
    pub trace_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::Hardened,
            name_limit: NAME_LIMIT,
            secret_path: PathBuf::from("/flag.txt"),
            trace_path: None,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name_limit == 0 || self.name_limit > NAME_LIMIT {
            return Err(ConfigError::NameLimit { got: self.name_limit, max: NAME_LIMIT });
        }
        Ok(())
    }
}

/// Loads and stores configuration files
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from a file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
        let config_str = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(config: &Config, path: P) -> Result<()> {
        let config_str = serde_json::to_string_pretty(config)?;
        fs::write(path, config_str)?;
        Ok(())
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for creating configurations
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Start from an existing configuration
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn name_limit(mut self, limit: usize) -> Self {
        self.config.name_limit = limit;
        self
    }

    pub fn secret_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.secret_path = path.into();
        self
    }

    pub fn trace_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.trace_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<Config, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
