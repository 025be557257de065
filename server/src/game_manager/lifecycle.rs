use crate::game_manager::{
    session::Phase, AppState, Connection, GameSession, ReplyRx, SessionError,
};
use chess_core::engine::config::resolve;
use chess_core::logic::game::{Actor, Color, GameLine, GameResult, Position, ResultKind};
use chess_core::logic::rules::Classification;
use chess_core::{DifficultyTier, EngineStatus};
use std::time::Instant;

impl AppState {
    pub fn add_connection(&self, id: &str) {
        tracing::info!(session_id = %id, "Connection opened");
        let last_msg_at = Instant::now()
            .checked_sub(self.rate_limit)
            .unwrap_or_else(Instant::now);
        self.connections
            .insert(id.to_string(), Connection { last_msg_at });
    }

    pub fn remove_connection(&self, id: &str) {
        tracing::info!(session_id = %id, "Connection closed");
        self.connections.remove(id);
    }

    /// Replaces `session` with a fresh one on a new engine when its engine
    /// has failed or been shut down. Returns whether a swap happened.
    pub async fn renew_if_engine_down(
        &self,
        session: &mut GameSession,
        replies: &mut ReplyRx,
    ) -> bool {
        let status = session.adapter_status();
        if !matches!(status, EngineStatus::Error | EngineStatus::Idle) {
            return false;
        }
        tracing::warn!(session_id = %session.id, engine_status = %status, "Restarting engine");
        session.shutdown().await;
        let (fresh, fresh_replies) = self.open_session(session.id.clone());
        *session = fresh;
        *replies = fresh_replies;
        true
    }
}

impl GameSession {
    /// Starts a game from the standard position.
    pub fn start(&mut self, player_color: Color, tier: DifficultyTier) {
        self.start_from_position(Position::initial(), player_color, tier);
    }

    /// Starts a game from `position`. Whose turn it is decides the first
    /// phase; an opponent to move gets its request scheduled right away.
    pub fn start_from_position(
        &mut self,
        position: Position,
        player_color: Color,
        tier: DifficultyTier,
    ) {
        self.generation += 1;
        self.pending = None;
        self.line = GameLine::new(position);
        self.player_color = player_color;
        self.difficulty = Some(tier);
        self.config = self
            .profiles
            .get(&tier)
            .cloned()
            .unwrap_or_else(|| resolve(tier));
        self.result = None;
        self.classification = Classification::default();

        tracing::info!(
            session_id = %self.id,
            generation = self.generation,
            player = %player_color,
            difficulty = %tier,
            "Game started"
        );
        if let Err(e) = self.settle() {
            tracing::error!(session_id = %self.id, error = %e, "Start position rejected");
        }
    }

    /// Ends the game in the opponent's favour.
    pub fn resign(&mut self) -> Result<(), SessionError> {
        match self.phase {
            Phase::AwaitingPlayerMove | Phase::AwaitingOpponentMove => {
                self.generation += 1;
                tracing::info!(session_id = %self.id, generation = self.generation, "Player resigned");
                self.finish(GameResult::resignation());
                Ok(())
            }
            Phase::Uninitialized | Phase::Terminal => Err(SessionError::GameNotInProgress),
        }
    }

    /// Takes back the player's last move together with the opponent's reply
    /// to it, if any. Returns false and changes nothing when fewer than two
    /// moves exist or the game ended off the board.
    pub fn undo(&mut self) -> bool {
        let ended_off_board = self.result.as_ref().is_some_and(|result| {
            matches!(result.kind, ResultKind::Resignation | ResultKind::Aborted)
        });
        if ended_off_board || self.phase == Phase::Uninitialized || self.line.moves().len() < 2 {
            return false;
        }
        let plies = match self.line.moves().last() {
            Some(record) if record.actor == Actor::Player => 1,
            _ => 2,
        };
        match self.line.take_back(&*self.validator, plies) {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                tracing::error!(session_id = %self.id, error = %e, "Undo replay failed");
                return false;
            }
        }

        self.generation += 1;
        self.pending = None;
        self.result = None;
        self.classification = match self.line.classify(&*self.validator) {
            Ok(classification) => classification,
            Err(e) => {
                tracing::warn!(session_id = %self.id, error = %e, "Could not classify after undo");
                Classification::default()
            }
        };
        self.phase = Phase::AwaitingPlayerMove;
        tracing::info!(
            session_id = %self.id,
            generation = self.generation,
            plies,
            "Move taken back"
        );
        true
    }

    /// Back to the start screen; history is dropped.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.pending = None;
        self.line = GameLine::default();
        self.phase = Phase::Uninitialized;
        self.difficulty = None;
        self.result = None;
        self.classification = Classification::default();
        tracing::info!(session_id = %self.id, generation = self.generation, "Session reset");
    }

    pub(super) fn finish(&mut self, result: GameResult) {
        tracing::info!(
            session_id = %self.id,
            result = %result.message(),
            "Game over"
        );
        self.pending = None;
        self.phase = Phase::Terminal;
        self.result = Some(result);
    }

    /// Stops the engine process. The session is unusable afterwards.
    pub async fn shutdown(&mut self) {
        self.generation += 1;
        self.pending = None;
        self.engine.shutdown().await;
    }
}
