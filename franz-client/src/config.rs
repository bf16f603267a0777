//! Client configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via FRANZ_CONFIG)
//! 3. Environment variables

use crate::connection::ConnectionConfig;
use franz_protocol::{Compression, DEFAULT_PORT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Broker address, `host:port`.
    pub broker: String,
    /// TCP connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Socket read/write timeout in milliseconds. 0 disables it.
    pub io_timeout_ms: u64,
    /// Maximum bytes per fetch.
    pub fetch_max_size: u32,
    /// Codec used by the producer.
    pub compression: Compression,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            broker: format!("127.0.0.1:{}", DEFAULT_PORT),
            connect_timeout_ms: 10_000,
            io_timeout_ms: 30_000,
            fetch_max_size: 1024 * 1024,
            compression: Compression::None,
        }
    }
}

impl ClientConfig {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("FRANZ_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: ClientConfig = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("FRANZ_BROKER") {
            if !addr.is_empty() {
                self.broker = addr;
            }
        }

        if let Ok(timeout) = std::env::var("FRANZ_CONNECT_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse() {
                self.connect_timeout_ms = ms;
            }
        }

        if let Ok(timeout) = std::env::var("FRANZ_IO_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse() {
                self.io_timeout_ms = ms;
            }
        }

        if let Ok(size) = std::env::var("FRANZ_FETCH_MAX_SIZE") {
            if let Ok(n) = size.parse() {
                self.fetch_max_size = n;
            }
        }

        if let Ok(codec) = std::env::var("FRANZ_COMPRESSION") {
            if let Ok(c) = codec.parse() {
                self.compression = c;
            }
        }
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        match self.io_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig::new(self.broker.clone())
            .with_connect_timeout(self.connect_timeout())
            .with_io_timeout(self.io_timeout())
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
