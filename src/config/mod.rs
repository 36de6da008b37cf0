//! Configuration module
//!
//! Handles loading and saving reslink configuration.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default UDP port of the radio bridge / simulator
pub const DEFAULT_LINK_PORT: u16 = 19950;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Link settings
    #[serde(default)]
    pub link: LinkConfig,
}

/// General configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging
    #[serde(default)]
    pub verbose: bool,
    /// Log file path (optional)
    pub log_file: Option<PathBuf>,
}

/// Link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Host of the radio bridge or simulator
    #[serde(default = "default_address")]
    pub address: String,
    /// UDP port of the radio bridge or simulator
    #[serde(default = "default_port")]
    pub port: u16,
    /// Local address to bind to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_LINK_PORT
}

fn default_bind_address() -> String {
    "0.0.0.0:0".to_string()
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            bind_address: default_bind_address(),
        }
    }
}

impl LinkConfig {
    /// Parse the local bind address
    pub fn bind_addr(&self) -> ConfigResult<SocketAddr> {
        self.bind_address
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(self.bind_address.clone()))
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default location
    pub fn load_default() -> ConfigResult<Self> {
        for path in Self::default_paths() {
            if path.exists() {
                tracing::debug!("Loading configuration from {}", path.display());
                return Self::load(&path);
            }
        }

        // Return default config if no file found
        Ok(Self::default())
    }

    /// Locations searched by `load_default`, in order
    pub fn default_paths() -> Vec<PathBuf> {
        [
            dirs::config_dir().map(|p| p.join("reslink/config.toml")),
            Some(PathBuf::from("./reslink.toml")),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config() -> ConfigResult<String> {
    let config = Config {
        general: GeneralConfig {
            verbose: true,
            log_file: None,
        },
        link: LinkConfig {
            address: "radio-bridge.local".to_string(),
            ..Default::default()
        },
    };

    Ok(toml::to_string_pretty(&config)?)
}
