//! Configuration management for Crosspoint
//!
//! This module provides:
//! - Routing policy settings (fallback on device loss, mono handling, default gain)
//! - TOML serialization of the settings file
//! - A config manager resolving the per-user config location
//!
//! Routing state itself (gains, selection, channel map) is never persisted.

use crate::domain::audio::{self, AudioError};
use crate::domain::channel_map::{ChannelMapResolver, MonoPolicy};
use crate::domain::matrix::{validate_gain, UNITY};
use crate::domain::routing::RoutingPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, info, instrument};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// What happens to the selection when its device disappears
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionFallback {
    /// Drop the selection and go silent
    #[default]
    Silence,
    /// Select the first device that still exposes channels
    FirstAvailable,
}

/// Routing engine policy settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Behaviour when the selected device is unplugged
    pub selection_fallback: SelectionFallback,

    /// Handling of single-channel output devices
    pub mono_policy: MonoPolicy,

    /// Gain the default routing applies to the selected pair
    pub default_gain: f32,

    /// Device uid to select as soon as it shows up in the topology
    pub preferred_device: Option<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            selection_fallback: SelectionFallback::Silence,
            mono_policy: MonoPolicy::FoldDown,
            default_gain: UNITY,
            preferred_device: None,
        }
    }
}

impl RoutingConfig {
    pub fn validate(&self) -> Result<()> {
        validate_gain(self.default_gain)
            .map_err(|e| ConfigError::Invalid(format!("default_gain: {}", e)))?;
        if let Some(uid) = &self.preferred_device {
            if uid.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "preferred_device must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn policy(&self) -> audio::Result<RoutingPolicy> {
        RoutingPolicy::with_gain(self.default_gain)
            .map_err(|e| AudioError::InvalidConfiguration(format!("default_gain: {}", e)))
    }

    pub fn resolver(&self) -> ChannelMapResolver {
        ChannelMapResolver::new(self.mono_policy)
    }
}

/// Complete Crosspoint configuration file
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CrosspointConfig {
    #[serde(default)]
    pub routing: RoutingConfig,
}

impl CrosspointConfig {
    /// Load configuration from TOML file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&contents)?;
        config.routing.validate()?;

        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to TOML file
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving configuration");

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        fs::write(path, toml_str).await?;

        debug!("Configuration saved successfully");
        Ok(())
    }
}

/// Configuration manager for the main Crosspoint config
///
/// Manages the configuration file at `~/.config/crosspoint/config.toml`.
pub struct ConfigManager {
    config_dir: PathBuf,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_path = config_dir.join("config.toml");
        Self {
            config_dir,
            config_path,
        }
    }

    /// Get the default config directory path
    ///
    /// Returns `~/.config/crosspoint` on Linux/Mac
    /// Returns `%APPDATA%\crosspoint` on Windows
    pub fn default_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("crosspoint"))
            .ok_or_else(|| ConfigError::Invalid("Could not determine config directory".to_string()))
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load configuration from file
    ///
    /// A missing file yields the defaults. A corrupt or invalid file is backed
    /// up next to the original and the defaults are used instead.
    #[instrument(skip(self))]
    pub async fn load(&self) -> CrosspointConfig {
        if !self.config_path.exists() {
            info!(
                path = %self.config_path.display(),
                "Config file not found, using defaults"
            );
            return CrosspointConfig::default();
        }

        match CrosspointConfig::load_from_file(&self.config_path).await {
            Ok(config) => config,
            Err(e) => {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to load config, using defaults"
                );

                let backup_path = self.config_path.with_extension("toml.corrupt");
                if let Err(copy_err) = fs::copy(&self.config_path, &backup_path).await {
                    error!(
                        path = %backup_path.display(),
                        error = %copy_err,
                        "Failed to backup corrupt config"
                    );
                }

                CrosspointConfig::default()
            }
        }
    }

    /// Save configuration to file
    #[instrument(skip(self, config))]
    pub async fn save(&self, config: &CrosspointConfig) -> Result<()> {
        fs::create_dir_all(&self.config_dir).await?;
        config.save_to_file(&self.config_path).await
    }

    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }
}
