use crate::game_manager::session::{now_ms, OpponentReply, Phase};
use crate::game_manager::{GameSession, SessionError};
use chess_core::logic::game::{Actor, GameResult, MoveRecord};
use chess_core::logic::notation::decode;
use chess_core::logic::rules::MoveRejected;
use chess_core::{MoveDescriptor, PromotionPiece, Square};
use std::sync::Arc;
use std::time::Duration;

impl GameSession {
    /// Applies the player's move. Nothing changes unless it returns `Ok`.
    pub fn submit_player_move(
        &mut self,
        from: Square,
        to: Square,
        promotion: Option<PromotionPiece>,
    ) -> Result<MoveRecord, SessionError> {
        if self.phase != Phase::AwaitingPlayerMove {
            return Err(SessionError::NotPlayersTurn);
        }
        if promotion.is_none()
            && self
                .validator
                .requires_promotion(self.line.position(), from, to)
        {
            return Err(SessionError::PromotionRequired);
        }

        let mv = MoveDescriptor::new(from, to, promotion);
        let record = self
            .line
            .play(&*self.validator, mv, Actor::Player, now_ms())
            .map_err(|e| match e {
                MoveRejected::Illegal(address) => SessionError::IllegalMove(address),
                other => SessionError::Rules(other),
            })?;
        tracing::debug!(
            session_id = %self.id,
            generation = self.generation,
            san = %record.algebraic,
            "Player moved"
        );
        self.settle()?;
        Ok(record)
    }

    /// Applies an opponent reply. A reply from an older generation is
    /// dropped and yields `Ok(None)`.
    ///
    /// Any failure ends the game as aborted; the error is returned for
    /// reporting.
    pub fn handle_opponent_reply(
        &mut self,
        reply: OpponentReply,
    ) -> Result<Option<MoveRecord>, SessionError> {
        if reply.generation != self.generation
            || self.pending != Some(reply.generation)
            || self.phase != Phase::AwaitingOpponentMove
        {
            tracing::debug!(
                session_id = %self.id,
                generation = self.generation,
                stale_generation = reply.generation,
                "Discarding stale opponent reply"
            );
            return Ok(None);
        }
        self.pending = None;

        let best = match reply.result {
            Ok(best) => best,
            Err(e) => {
                self.finish(GameResult::aborted(e.to_string()));
                return Err(e.into());
            }
        };
        let mv = match decode(&best.address) {
            Ok(mv) => mv,
            Err(e) => {
                self.finish(GameResult::aborted(format!(
                    "engine sent malformed move {:?}",
                    best.address
                )));
                return Err(e.into());
            }
        };
        let record = match self
            .line
            .play(&*self.validator, mv, Actor::Opponent, now_ms())
        {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(session_id = %self.id, address = %best.address, error = %e, "Engine move rejected");
                self.finish(GameResult::aborted(format!(
                    "engine played illegal move {}",
                    best.address
                )));
                return Err(SessionError::EngineIllegalMove(best.address));
            }
        };
        tracing::debug!(
            session_id = %self.id,
            generation = self.generation,
            san = %record.algebraic,
            elapsed_ms = u64::try_from(best.elapsed.as_millis()).unwrap_or(u64::MAX),
            "Opponent moved"
        );
        self.settle()?;
        Ok(Some(record))
    }

    /// Classifies the current position and moves to the phase it implies.
    /// A position that cannot be classified ends the game as aborted.
    pub(super) fn settle(&mut self) -> Result<(), SessionError> {
        let classification = match self.line.classify(&*self.validator) {
            Ok(classification) => classification,
            Err(e) => {
                let reason = format!("could not classify position: {e}");
                self.finish(GameResult::aborted(reason));
                return Err(e.into());
            }
        };
        self.classification = classification;

        let to_move = self.line.position().turn();
        let last_mover = self.actor_for(to_move.opposite());
        if let Some(result) = GameResult::from_classification(&classification, last_mover) {
            self.finish(result);
        } else if self.actor_for(to_move) == Actor::Player {
            self.phase = Phase::AwaitingPlayerMove;
        } else {
            self.phase = Phase::AwaitingOpponentMove;
            self.request_opponent_move();
        }
        Ok(())
    }

    /// Issues the single outstanding opponent request under a new generation.
    fn request_opponent_move(&mut self) {
        self.generation += 1;
        let generation = self.generation;
        self.pending = Some(generation);

        let engine = Arc::clone(&self.engine);
        let replies = self.replies.clone();
        let position = self.line.position().clone();
        let config = self.config.clone();
        let timeout = Duration::from_millis(config.move_time_ms);
        tracing::debug!(session_id = %self.id, generation, "Requesting opponent move");

        tokio::spawn(async move {
            let result = engine.best_move(&position, &config, timeout).await;
            let _ = replies.send(OpponentReply { generation, result });
        });
    }
}
