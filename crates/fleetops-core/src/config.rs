//! Configuration management for FleetOps
//!
//! Handles loading, saving, and managing engine configuration: the retry
//! allow-list, ledger listing limits and logging defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::task::TaskType;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Commissioner settings
    #[serde(default)]
    pub commissioner: CommissionerConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Commissioner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommissionerConfig {
    /// Task types that may be retried. Only types whose side effects are safe
    /// to replay from scratch belong here.
    pub retryable_task_types: Vec<TaskType>,
    /// Maximum ledger rows returned by a task listing
    pub task_query_limit: usize,
    /// Poll interval used while waiting for a task to finish (milliseconds)
    pub wait_poll_interval_ms: u64,
}

impl Default for CommissionerConfig {
    fn default() -> Self {
        Self {
            retryable_task_types: vec![TaskType::CreateUniverse],
            task_query_limit: 2000,
            wait_poll_interval_ms: 100,
        }
    }
}

impl CommissionerConfig {
    pub fn is_retryable(&self, task_type: TaskType) -> bool {
        self.retryable_task_types.contains(&task_type)
    }

    pub fn wait_poll_interval(&self) -> Duration {
        Duration::from_millis(self.wait_poll_interval_ms.max(1))
    }

    pub fn with_retryable(mut self, task_types: Vec<TaskType>) -> Self {
        self.retryable_task_types = task_types;
        self
    }

    pub fn with_task_query_limit(mut self, limit: usize) -> Self {
        self.task_query_limit = limit;
        self
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (overridden by RUST_LOG)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Configuration manager for loading and saving config
pub struct ConfigManager {
    config_path: PathBuf,
    config: Config,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::with_path(config_path)
    }

    /// Create a config manager with a specific path
    pub fn with_path(config_path: PathBuf) -> Result<Self> {
        let config = if config_path.exists() {
            Self::load_from_path(&config_path)?
        } else {
            Config::default()
        };

        Ok(Self { config_path, config })
    }

    /// Get the default config path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not find config directory".to_string()))?;

        Ok(config_dir.join("fleetops").join("config.toml"))
    }

    /// Load configuration from a file
    fn load_from_path(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Get the current configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get mutable access to configuration
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Save the current configuration to disk
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create config dir: {}", e)))?;
        }

        let content = toml::to_string_pretty(&self.config)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(&self.config_path, content)
            .map_err(|e| Error::Config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }
}
