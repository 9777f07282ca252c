//! Configuration loading, validation, and management for CareClaw.
//!
//! Loads configuration from `~/.careclaw/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use careclaw_core::role::Role;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.careclaw/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Memory filtering configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Priority classifier thresholds
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Session storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Per-role overrides, keyed by role name
    #[serde(default)]
    pub roles: BTreeMap<String, RoleOverride>,

    /// Logging configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Budget passed to relevance filtering by the reasoning loop.
    #[serde(default = "default_budget")]
    pub default_budget: u32,
}

fn default_budget() -> u32 {
    300
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            default_budget: default_budget(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Messages longer than this (in characters) with no keyword hit are
    /// classified as medium priority.
    #[serde(default = "default_long_message_chars")]
    pub long_message_chars: usize,

    /// Greetings and acknowledgements shorter than this are low priority.
    #[serde(default = "default_greeting_max_chars")]
    pub greeting_max_chars: usize,
}

fn default_long_message_chars() -> usize {
    25
}
fn default_greeting_max_chars() -> usize {
    10
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            long_message_chars: default_long_message_chars(),
            greeting_max_chars: default_greeting_max_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "memory" or "file"
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Directory for the file backend
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

fn default_storage_backend() -> String {
    "memory".into()
}
fn default_storage_path() -> PathBuf {
    AppConfig::config_dir().join("sessions")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            path: default_storage_path(),
        }
    }
}

/// Optional per-role adjustments to the static policy table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_budget: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Emit logs as JSON lines instead of human-readable text.
    #[serde(default)]
    pub json_logs: bool,
}

impl AppConfig {
    /// Load configuration from the default path (~/.careclaw/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `CARECLAW_MEMORY_BUDGET`
    /// - `CARECLAW_STORAGE_PATH`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(budget) = std::env::var("CARECLAW_MEMORY_BUDGET") {
            self.memory.default_budget = budget.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "CARECLAW_MEMORY_BUDGET must be a positive integer, got '{budget}'"
                ))
            })?;
        }

        if let Ok(path) = std::env::var("CARECLAW_STORAGE_PATH") {
            self.storage.path = PathBuf::from(path);
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".careclaw")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.memory.default_budget == 0 {
            return Err(ConfigError::ValidationError(
                "memory.default_budget must be > 0".into(),
            ));
        }

        if self.classifier.long_message_chars == 0 || self.classifier.greeting_max_chars == 0 {
            return Err(ConfigError::ValidationError(
                "classifier thresholds must be > 0".into(),
            ));
        }

        if !matches!(self.storage.backend.as_str(), "memory" | "file") {
            return Err(ConfigError::ValidationError(format!(
                "unknown storage backend '{}' (expected 'memory' or 'file')",
                self.storage.backend
            )));
        }

        for (name, overrides) in &self.roles {
            name.parse::<Role>()
                .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

            if let Some(max) = overrides.max_iterations {
                if !(1..=10).contains(&max) {
                    return Err(ConfigError::ValidationError(format!(
                        "roles.{name}.max_iterations must be between 1 and 10"
                    )));
                }
            }
            if overrides.memory_budget == Some(0) {
                return Err(ConfigError::ValidationError(format!(
                    "roles.{name}.memory_budget must be > 0"
                )));
            }
        }

        Ok(())
    }

    /// Overrides configured for a role, if any.
    pub fn role_override(&self, role: Role) -> RoleOverride {
        self.roles.get(role.as_str()).cloned().unwrap_or_default()
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            memory: MemoryConfig::default(),
            classifier: ClassifierConfig::default(),
            storage: StorageConfig::default(),
            roles: BTreeMap::new(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
