use chess_core::engine::{BestMove, EngineError, EngineStatus, MoveSource};
use chess_core::logic::game::{
    Actor, Color, GameLine, GameResult, SessionSnapshot, SessionStatus,
};
use chess_core::logic::rules::{Classification, Validator};
use chess_core::{DifficultyTier, EngineConfig, Square};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, watch};

use super::SessionError;

pub type Profiles = HashMap<DifficultyTier, EngineConfig>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    AwaitingPlayerMove,
    AwaitingOpponentMove,
    Terminal,
}

/// Outcome of one opponent-move request, tagged with the generation that
/// issued it.
#[derive(Debug)]
pub struct OpponentReply {
    pub generation: u64,
    pub result: Result<BestMove, EngineError>,
}

pub type ReplyRx = mpsc::UnboundedReceiver<OpponentReply>;

pub struct GameSession {
    pub id: String,
    pub(super) validator: Arc<dyn Validator>,
    pub(super) engine: Arc<dyn MoveSource>,
    pub(super) profiles: Arc<Profiles>,
    pub(super) line: GameLine,
    pub(super) phase: Phase,
    pub(super) player_color: Color,
    pub(super) difficulty: Option<DifficultyTier>,
    pub(super) config: EngineConfig,
    pub(super) generation: u64,
    pub(super) pending: Option<u64>,
    pub(super) classification: Classification,
    pub(super) result: Option<GameResult>,
    pub(super) replies: mpsc::UnboundedSender<OpponentReply>,
}

impl GameSession {
    /// Creates a session in `Uninitialized`. Opponent replies arrive on the
    /// returned receiver and must be fed back through
    /// [`GameSession::handle_opponent_reply`].
    pub fn new(
        id: String,
        validator: Arc<dyn Validator>,
        engine: Arc<dyn MoveSource>,
        profiles: Arc<Profiles>,
    ) -> (Self, ReplyRx) {
        let (replies, rx) = mpsc::unbounded_channel();
        let session = Self {
            id,
            validator,
            engine,
            profiles,
            line: GameLine::default(),
            phase: Phase::Uninitialized,
            player_color: Color::White,
            difficulty: None,
            config: EngineConfig::default(),
            generation: 0,
            pending: None,
            classification: Classification::default(),
            result: None,
            replies,
        };
        (session, rx)
    }

    pub fn adapter_status(&self) -> EngineStatus {
        self.engine.status()
    }

    pub fn watch_engine(&self) -> watch::Receiver<EngineStatus> {
        self.engine.subscribe()
    }

    pub(super) fn actor_for(&self, color: Color) -> Actor {
        if color == self.player_color {
            Actor::Player
        } else {
            Actor::Opponent
        }
    }

    /// Destination squares for move hints, from `square` or from anywhere.
    pub fn legal_moves(&self, square: Option<Square>) -> Result<Vec<Square>, SessionError> {
        if self.phase != Phase::AwaitingPlayerMove {
            return Ok(Vec::new());
        }
        Ok(self.validator.legal_moves(self.line.position(), square)?)
    }

    pub fn status(&self) -> SessionStatus {
        match self.phase {
            Phase::Uninitialized if self.engine.status() == EngineStatus::Initializing => {
                SessionStatus::Initializing
            }
            Phase::Uninitialized => SessionStatus::StartScreen,
            Phase::AwaitingPlayerMove => SessionStatus::PlayerTurn,
            Phase::AwaitingOpponentMove => SessionStatus::AiThinking,
            Phase::Terminal => SessionStatus::GameOver,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let position = self.line.position();
        let c = &self.classification;
        SessionSnapshot {
            status: self.status(),
            fen: position.as_fen().to_string(),
            turn: position.turn(),
            moves: self.line.moves().to_vec(),
            player_color: self.player_color,
            opponent_color: self.player_color.opposite(),
            difficulty: self.difficulty,
            is_check: c.check,
            is_checkmate: c.checkmate,
            is_stalemate: c.stalemate,
            is_draw: c.draw.is_some(),
            draw_reason: c.draw,
            king_in_check: c.king_in_check,
            last_move: self.line.last_move(),
            captured: self.line.captured(),
            result: self.result.clone(),
            result_message: self.result.as_ref().map(GameResult::message),
            engine_status: self.engine.status(),
        }
    }
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}
