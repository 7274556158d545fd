//! Configuration management for AccessChain

use crate::error::ChainError;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub integrity: IntegrityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Address advertised to peers; peers reach us at `address:port`.
    #[serde(default = "default_address")]
    pub address: String,
    /// Peer to join through. Absent means this node founds a new network.
    #[serde(default)]
    pub bootstrap_peer: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_keys_dir")]
    pub keys_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntegrityConfig {
    #[serde(default = "default_block_interval_ms")]
    pub block_interval_ms: u64,
    #[serde(default = "default_network_interval_ms")]
    pub network_interval_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            address: default_address(),
            bootstrap_peer: None,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            keys_dir: default_keys_dir(),
        }
    }
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            block_interval_ms: default_block_interval_ms(),
            network_interval_ms: default_network_interval_ms(),
        }
    }
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.network.request_timeout_ms)
    }

    pub fn block_integrity_interval(&self) -> Duration {
        Duration::from_millis(self.integrity.block_interval_ms)
    }

    pub fn network_integrity_interval(&self) -> Duration {
        Duration::from_millis(self.integrity.network_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ChainError> {
        if self.network.port == 0 {
            return Err(ChainError::Config("network.port must be non-zero".to_string()));
        }
        if self.network.address.trim().is_empty() {
            return Err(ChainError::Config("network.address must be set".to_string()));
        }
        if self.storage.data_dir.is_empty() || self.storage.keys_dir.is_empty() {
            return Err(ChainError::Config(
                "storage.data_dir and storage.keys_dir must be set".to_string(),
            ));
        }
        if self.integrity.block_interval_ms == 0 || self.integrity.network_interval_ms == 0 {
            return Err(ChainError::Config(
                "integrity intervals must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load `config.toml` from the working directory, falling back to defaults when absent.
pub fn load_config() -> Result<Config, ChainError> {
    load_config_from(Path::new(DEFAULT_CONFIG_PATH))
}

pub fn load_config_from(path: &Path) -> Result<Config, ChainError> {
    let config_str = if path.exists() {
        fs::read_to_string(path)?
    } else {
        String::new()
    };

    let config: Config = if config_str.trim().is_empty() {
        Config::default()
    } else {
        toml::from_str(&config_str)
            .map_err(|e| ChainError::Config(format!("Failed to parse {}: {}", path.display(), e)))?
    };

    config.validate()?;
    Ok(config)
}

fn default_port() -> u16 {
    65006
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_data_dir() -> String {
    "./files".to_string()
}

fn default_keys_dir() -> String {
    "./keys".to_string()
}

fn default_block_interval_ms() -> u64 {
    60_000
}

fn default_network_interval_ms() -> u64 {
    300_000
}
