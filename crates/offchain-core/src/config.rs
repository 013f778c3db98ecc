//! Protocol configuration
//!
//! Configuration is loaded from TOML, then overridden by `OFFCHAIN_*`
//! environment variables, then validated.

use crate::conflict::TieBreak;
use crate::errors::OffchainError;
use crate::reliability::{BackoffStrategy, RetryPolicy};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "OFFCHAIN_";

/// Common behavior of configuration types
pub trait OffchainConfig: Clone + Default + DeserializeOwned + Send + Sync + 'static {
    /// Load configuration from a TOML file
    fn load_from_file(path: &Path) -> Result<Self, OffchainError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            OffchainError::not_found(format!("config file {}: {e}", path.display()))
        })?;
        toml::from_str(&content)
            .map_err(|e| OffchainError::invalid(format!("config file {}: {e}", path.display())))
    }

    /// Merge with environment variables
    fn merge_with_env(&mut self) -> Result<(), OffchainError> {
        for (key, value) in std::env::vars() {
            if let Some(name) = key.strip_prefix(ENV_PREFIX) {
                self.set_from_string(&name.to_lowercase(), &value)?;
            }
        }
        Ok(())
    }

    /// Set a configuration value by key; unknown keys are ignored
    fn set_from_string(&mut self, key: &str, value: &str) -> Result<(), OffchainError>;

    /// Validate the configuration
    fn validate(&self) -> Result<(), OffchainError>;
}

/// Tunables of the sequencing and exchange protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Conflict resolution policy; both parties must agree on it
    pub tie_break: TieBreak,
    /// Retry policy for request/response round-trips
    pub retry: RetryPolicy,
    /// Timeout of a single network round-trip
    pub request_timeout_ms: u64,
    /// Maximum commands per outbound request
    pub max_batch_size: usize,
    /// Period of background synchronization
    pub sync_interval_ms: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            tie_break: TieBreak::default(),
            retry: RetryPolicy::default(),
            request_timeout_ms: 5_000,
            max_batch_size: 64,
            sync_interval_ms: 1_000,
        }
    }
}

impl ProtocolConfig {
    /// Round-trip timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Background sync period
    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, OffchainError> {
    value
        .parse()
        .map_err(|_| OffchainError::invalid(format!("{key}: expected a number, got {value:?}")))
}

fn parse_enum<T: DeserializeOwned>(key: &str, value: &str) -> Result<T, OffchainError> {
    serde_json::from_value(serde_json::Value::String(value.to_string()))
        .map_err(|_| OffchainError::invalid(format!("{key}: unknown value {value:?}")))
}

impl OffchainConfig for ProtocolConfig {
    fn set_from_string(&mut self, key: &str, value: &str) -> Result<(), OffchainError> {
        match key {
            "tie_break" => self.tie_break = parse_enum(key, value)?,
            "request_timeout_ms" => self.request_timeout_ms = parse_number(key, value)?,
            "max_batch_size" => self.max_batch_size = parse_number(key, value)?,
            "sync_interval_ms" => self.sync_interval_ms = parse_number(key, value)?,
            "retry_max_attempts" => self.retry.max_attempts = parse_number(key, value)?,
            "retry_initial_delay_ms" => self.retry.initial_delay_ms = parse_number(key, value)?,
            "retry_max_delay_ms" => self.retry.max_delay_ms = parse_number(key, value)?,
            "retry_strategy" => self.retry.strategy = parse_enum::<BackoffStrategy>(key, value)?,
            _ => tracing::trace!(key, "ignoring unknown protocol setting"),
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), OffchainError> {
        if self.retry.max_attempts == 0 {
            return Err(OffchainError::invalid("retry.max_attempts must be at least 1"));
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(OffchainError::invalid(
                "retry.initial_delay_ms must not exceed retry.max_delay_ms",
            ));
        }
        if self.max_batch_size == 0 {
            return Err(OffchainError::invalid("max_batch_size must be at least 1"));
        }
        if self.request_timeout_ms == 0 {
            return Err(OffchainError::invalid("request_timeout_ms must be positive"));
        }
        Ok(())
    }
}
