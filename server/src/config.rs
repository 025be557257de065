use chess_core::engine::config::{resolve, EngineOverrides};
use chess_core::engine::AdapterSettings;
use chess_core::{DifficultyTier, EngineConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_ENV: &str = "CHESS_SERVER_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// UCI engine executable, looked up on `PATH` when not absolute.
    pub engine_path: String,
    pub engine_args: Vec<String>,
    pub init_timeout_ms: u64,
    pub response_grace_ms: u64,
    /// Minimum gap between two messages on one connection.
    pub rate_limit_ms: u64,
    pub tiers: HashMap<DifficultyTier, EngineOverrides>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            engine_path: "stockfish".to_string(),
            engine_args: Vec::new(),
            init_timeout_ms: 10_000,
            response_grace_ms: 1_000,
            rate_limit_ms: 100,
            tiers: HashMap::new(),
        }
    }
}

impl ServerConfig {
    /// Reads the file named by `CHESS_SERVER_CONFIG`, or returns the defaults
    /// when the variable is unset or the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load_from_path(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(json) => Self::from_json(&json),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub const fn adapter_settings(&self) -> AdapterSettings {
        AdapterSettings {
            init_timeout: Duration::from_millis(self.init_timeout_ms),
            response_grace: Duration::from_millis(self.response_grace_ms),
        }
    }

    /// Engine configuration for every tier with this file's overrides applied.
    pub fn profiles(&self) -> HashMap<DifficultyTier, EngineConfig> {
        DifficultyTier::ALL
            .into_iter()
            .map(|tier| {
                let config = match self.tiers.get(&tier) {
                    Some(overrides) => resolve(tier).with_overrides(overrides),
                    None => resolve(tier),
                };
                (tier, config)
            })
            .collect()
    }
}
