//! Configuration management for Meridian

use crate::error::ChainError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub miner: MinerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_p2p_port")]
    pub p2p_port: u16,
    #[serde(default = "default_network_id")]
    pub network_id: String,
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChainConfig {
    /// Required leading zero hex digits in a block hash.
    #[serde(default = "default_difficulty")]
    pub difficulty: u32,
    /// Maximum transactions finalized into one block candidate.
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    /// Period of the finalization tick.
    #[serde(default = "default_finalize_interval_ms")]
    pub finalize_interval_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct MinerConfig {
    #[serde(default = "default_mining_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    /// Where accepted blocks are appended, one JSON object per line.
    #[serde(default = "default_blocks_path")]
    pub blocks_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            network: NetworkConfig::default(),
            chain: ChainConfig::default(),
            miner: MinerConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            p2p_port: default_p2p_port(),
            network_id: default_network_id(),
            bootstrap_peers: Vec::new(),
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        ChainConfig {
            difficulty: default_difficulty(),
            block_size: default_block_size(),
            finalize_interval_ms: default_finalize_interval_ms(),
        }
    }
}

impl Default for MinerConfig {
    fn default() -> Self {
        MinerConfig {
            enabled: default_mining_enabled(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            blocks_path: default_blocks_path(),
        }
    }
}

fn default_p2p_port() -> u16 {
    7440
}

fn default_network_id() -> String {
    "devnet".to_string()
}

fn default_difficulty() -> u32 {
    3
}

fn default_block_size() -> usize {
    3
}

fn default_finalize_interval_ms() -> u64 {
    1000
}

fn default_mining_enabled() -> bool {
    true
}

fn default_blocks_path() -> String {
    "./data/blocks.jsonl".to_string()
}

/// Load configuration from `path`, falling back to defaults when the file is
/// absent.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ChainError> {
    let config_str = fs::read_to_string(path.as_ref()).unwrap_or_default();
    let config: Config = if config_str.is_empty() {
        Config::default()
    } else {
        toml::from_str(&config_str)
            .map_err(|e| ChainError::Config(format!("Invalid config: {}", e)))?
    };

    // Validate critical values
    if config.chain.block_size == 0 {
        return Err(ChainError::Config(
            "chain.block_size must be at least 1".to_string(),
        ));
    }
    if config.chain.finalize_interval_ms == 0 {
        return Err(ChainError::Config(
            "chain.finalize_interval_ms must be at least 1".to_string(),
        ));
    }
    if config.storage.blocks_path.is_empty() {
        return Err(ChainError::Config(
            "storage.blocks_path must be set".to_string(),
        ));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = load_config("does-not-exist.toml").unwrap();
        assert_eq!(config.network.p2p_port, 7440);
        assert_eq!(config.chain.difficulty, 3);
        assert_eq!(config.chain.block_size, 3);
        assert!(config.miner.enabled);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[chain]\ndifficulty = 1\n\n[network]\np2p_port = 9000\nbootstrap_peers = [\"127.0.0.1:7440\"]\n",
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.chain.difficulty, 1);
        assert_eq!(config.chain.block_size, 3);
        assert_eq!(config.network.p2p_port, 9000);
        assert_eq!(config.network.bootstrap_peers, vec!["127.0.0.1:7440"]);
    }

    #[test]
    fn test_zero_block_size_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[chain]\nblock_size = 0\n").unwrap();

        assert!(matches!(
            load_config(&path),
            Err(ChainError::Config(_))
        ));
    }
}
