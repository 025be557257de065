use crate::config::ServerConfig;
use chess_core::engine::{EngineAdapter, EngineError, MoveSource};
use chess_core::logic::notation::NotationError;
use chess_core::logic::rules::{MoveRejected, ShakmatyValidator, Validator};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

pub mod lifecycle;
pub mod move_handler;
pub mod session;

pub use session::{GameSession, Profiles, ReplyRx};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("not the player's turn")]
    NotPlayersTurn,
    #[error("illegal move: {0}")]
    IllegalMove(String),
    #[error("promotion piece required")]
    PromotionRequired,
    #[error("no game in progress")]
    GameNotInProgress,
    #[error("engine protocol error: {0}")]
    Protocol(#[from] NotationError),
    #[error("engine played an illegal move: {0}")]
    EngineIllegalMove(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("rules validator failed: {0}")]
    Rules(#[from] MoveRejected),
}

pub type EngineFactory = Arc<dyn Fn() -> Arc<dyn MoveSource> + Send + Sync>;

pub struct Connection {
    pub last_msg_at: Instant,
}

pub struct AppState {
    pub connections: DashMap<String, Connection>,
    pub validator: Arc<dyn Validator>,
    pub profiles: Arc<Profiles>,
    pub engine_factory: EngineFactory,
    pub rate_limit: Duration,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Self {
        let program = config.engine_path.clone();
        let args = config.engine_args.clone();
        let settings = config.adapter_settings();
        let engine_factory: EngineFactory = Arc::new(move || {
            Arc::new(EngineAdapter::spawn(&program, &args, settings)) as Arc<dyn MoveSource>
        });
        Self::with_engine_factory(config, engine_factory)
    }

    pub fn with_engine_factory(config: &ServerConfig, engine_factory: EngineFactory) -> Self {
        Self {
            connections: DashMap::new(),
            validator: Arc::new(ShakmatyValidator),
            profiles: Arc::new(config.profiles()),
            engine_factory,
            rate_limit: Duration::from_millis(config.rate_limit_ms),
        }
    }

    /// Builds a fresh session with its own engine process.
    pub fn open_session(&self, id: String) -> (GameSession, ReplyRx) {
        GameSession::new(
            id,
            Arc::clone(&self.validator),
            (self.engine_factory)(),
            Arc::clone(&self.profiles),
        )
    }

    pub fn check_rate_limit(&self, connection_id: &str) -> bool {
        if let Some(mut connection) = self.connections.get_mut(connection_id) {
            let now = Instant::now();
            if now.duration_since(connection.last_msg_at) < self.rate_limit {
                return false;
            }
            connection.last_msg_at = now;
            true
        } else {
            false
        }
    }
}
