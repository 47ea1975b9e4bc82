//! Configuration management for the ledger engine

use crate::error::ChainError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub chain: ChainConfig,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_data_dir")]
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct ChainConfig {
    #[serde(default = "default_genesis_file")]
    pub genesis_file: String,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            genesis_file: default_genesis_file(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config, ChainError> {
    let config_str = fs::read_to_string(path).unwrap_or_default();
    let config: Config = if config_str.is_empty() {
        // Provide sane defaults when the config file is absent
        Config {
            database: DatabaseConfig {
                path: default_data_dir(),
            },
            chain: ChainConfig::default(),
        }
    } else {
        toml::from_str(&config_str).map_err(|e| ChainError::ConfigError(e.to_string()))?
    };

    // Validate critical values
    if config.database.path.is_empty() {
        return Err(ChainError::ConfigError(
            "database.path must be set".to_string(),
        ));
    }

    if config.chain.genesis_file.is_empty() {
        return Err(ChainError::ConfigError(
            "chain.genesis_file must be set".to_string(),
        ));
    }

    Ok(config)
}

fn default_data_dir() -> String {
    "./data/chain.db".to_string()
}

fn default_genesis_file() -> String {
    "./genesis.json".to_string()
}
