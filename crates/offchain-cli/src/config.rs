//! Node configuration
//!
//! `NodeConfig` wraps the protocol settings with process-level ones. Sources,
//! later ones winning: defaults, the TOML file, `OFFCHAIN_*` variables,
//! command-line flags.

use anyhow::{Context, Result};
use offchain_core::{OffchainConfig, OffchainError, ProtocolConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Directory of the file-backed journals
    pub store_dir: PathBuf,
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
    pub protocol: ProtocolConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from(".offchain/store"),
            log_level: "info".to_string(),
            protocol: ProtocolConfig::default(),
        }
    }
}

impl OffchainConfig for NodeConfig {
    fn set_from_string(&mut self, key: &str, value: &str) -> Result<(), OffchainError> {
        match key {
            "store_dir" => self.store_dir = PathBuf::from(value),
            "log_level" => self.log_level = value.to_string(),
            _ => self.protocol.set_from_string(key, value)?,
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), OffchainError> {
        self.protocol.validate()?;
        EnvFilter::try_new(&self.log_level)
            .map_err(|e| OffchainError::invalid(format!("log_level {:?}: {e}", self.log_level)))?;
        Ok(())
    }
}

/// Load the configuration, falling back to defaults when no file is given
pub fn load(path: Option<&Path>) -> Result<NodeConfig> {
    let mut config = match path {
        Some(path) => NodeConfig::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => NodeConfig::default(),
    };
    config.merge_with_env().context("applying environment overrides")?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}
