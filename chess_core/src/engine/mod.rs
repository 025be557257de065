pub mod adapter;
pub mod config;
pub mod protocol;
pub mod registry;

use crate::engine::config::EngineConfig;
use crate::logic::game::Position;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

pub use adapter::{AdapterSettings, EngineAdapter};

/// Lifecycle of the engine process as seen by its adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    Idle,
    Initializing,
    Ready,
    Thinking,
    Error,
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Thinking => "thinking",
            Self::Error => "error",
        })
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine initialization failed: {0}")]
    Initialization(String),
    #[error("engine did not answer within {0:?}")]
    Timeout(Duration),
    #[error("engine protocol violation: {0}")]
    Protocol(String),
    #[error("engine process disconnected")]
    Disconnected,
    #[error("engine adapter terminated")]
    Terminated,
    #[error("engine i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Raw answer to a search: the address text exactly as the engine sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BestMove {
    pub address: String,
    pub elapsed: Duration,
}

/// Anything that can answer "what would you play here".
#[async_trait]
pub trait MoveSource: Send + Sync {
    /// Searches `position` under `config`. `timeout` is the caller's budget
    /// before the adapter's grace period is added.
    async fn best_move(
        &self,
        position: &Position,
        config: &EngineConfig,
        timeout: Duration,
    ) -> Result<BestMove, EngineError>;

    fn status(&self) -> EngineStatus;

    /// Receiver that wakes on every status change.
    fn subscribe(&self) -> watch::Receiver<EngineStatus>;

    async fn shutdown(&self);
}
