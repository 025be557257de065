use crate::engine::config::DifficultyTier;
use crate::engine::EngineStatus;
use crate::logic::notation::{MoveDescriptor, PromotionPiece, Square};
use crate::logic::rules::{Classification, DrawReason, MoveRejected, Validator};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const INITIAL_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    White,
    Black,
}

impl Color {
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::White => Self::Black,
            Self::Black => Self::White,
        }
    }

    #[must_use]
    pub const fn fen_char(self) -> char {
        match self {
            Self::White => 'w',
            Self::Black => 'b',
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::White => write!(f, "white"),
            Self::Black => write!(f, "black"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PieceKind {
    Pawn,
    Knight,
    Bishop,
    Rook,
    Queen,
    King,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("expected six FEN fields, found {0}")]
    FieldCount(usize),
    #[error("unknown side to move: {0:?}")]
    SideToMove(String),
}

/// A board snapshot in six-field FEN.
///
/// Only the side-to-move field is interpreted here; everything else is the
/// validator's business.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Position {
    fen: String,
    turn: Color,
}

impl Position {
    #[must_use]
    pub fn initial() -> Self {
        Self {
            fen: INITIAL_FEN.to_string(),
            turn: Color::White,
        }
    }

    /// # Errors
    ///
    /// Fails when the text does not have six whitespace-separated fields or
    /// the second field is not `w`/`b`.
    pub fn parse(fen: &str) -> Result<Self, PositionError> {
        let fields: Vec<&str> = fen.split_whitespace().collect();
        if fields.len() != 6 {
            return Err(PositionError::FieldCount(fields.len()));
        }
        let turn = match fields.get(1).copied() {
            Some("w") => Color::White,
            Some("b") => Color::Black,
            other => return Err(PositionError::SideToMove(other.unwrap_or("").to_string())),
        };
        Ok(Self {
            fen: fields.join(" "),
            turn,
        })
    }

    #[must_use]
    pub fn as_fen(&self) -> &str {
        &self.fen
    }

    #[must_use]
    pub const fn turn(&self) -> Color {
        self.turn
    }

    /// Placement, side to move, castling rights and en-passant target: the
    /// part of the FEN that decides whether two positions repeat.
    #[must_use]
    pub fn repetition_key(&self) -> String {
        self.fen
            .split_whitespace()
            .take(4)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fen)
    }
}

impl TryFrom<String> for Position {
    type Error = PositionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Position> for String {
    fn from(value: Position) -> Self {
        value.fen
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actor {
    Player,
    Opponent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CastleSide {
    #[serde(rename = "k")]
    King,
    #[serde(rename = "q")]
    Queen,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveFlags {
    pub capture: bool,
    pub promotion: Option<PromotionPiece>,
    pub castle_side: Option<CastleSide>,
    pub en_passant: bool,
    pub gives_check: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRecord {
    pub algebraic: String,
    pub address: MoveDescriptor,
    pub actor: Actor,
    pub color: Color,
    pub timestamp_ms: u64,
    pub flags: MoveFlags,
    pub captured: Option<PieceKind>,
}

/// Played moves plus the position reached after each of them.
///
/// `positions[0]` is the starting position, `positions[i + 1]` the position
/// after `moves[i]`. History only grows at the tail or is cut from the tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameLine {
    start: Position,
    positions: Vec<Position>,
    moves: Vec<MoveRecord>,
}

impl Default for GameLine {
    fn default() -> Self {
        Self::new(Position::initial())
    }
}

impl GameLine {
    #[must_use]
    pub fn new(start: Position) -> Self {
        Self {
            positions: vec![start.clone()],
            start,
            moves: Vec::new(),
        }
    }

    #[must_use]
    pub const fn start(&self) -> &Position {
        &self.start
    }

    #[must_use]
    pub fn position(&self) -> &Position {
        self.positions.last().unwrap_or(&self.start)
    }

    #[must_use]
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    #[must_use]
    pub fn moves(&self) -> &[MoveRecord] {
        &self.moves
    }

    #[must_use]
    pub fn last_move(&self) -> Option<(Square, Square)> {
        self.moves
            .last()
            .map(|record| (record.address.from, record.address.to))
    }

    /// Applies `mv` to the current position and appends the record.
    ///
    /// # Errors
    ///
    /// Propagates the validator's rejection; the line is untouched then.
    pub fn play(
        &mut self,
        validator: &dyn Validator,
        mv: MoveDescriptor,
        actor: Actor,
        timestamp_ms: u64,
    ) -> Result<MoveRecord, MoveRejected> {
        let color = self.position().turn();
        let applied = validator.apply_move(self.position(), &mv)?;
        let record = MoveRecord {
            algebraic: applied.san,
            address: mv,
            actor,
            color,
            timestamp_ms,
            flags: applied.flags,
            captured: applied.captured,
        };
        self.positions.push(applied.position);
        self.moves.push(record.clone());
        Ok(record)
    }

    /// Classifies the current position against the line's own history.
    ///
    /// # Errors
    ///
    /// Fails only if the validator cannot read a stored position.
    pub fn classify(&self, validator: &dyn Validator) -> Result<Classification, MoveRejected> {
        validator.classify(self.position(), &self.positions)
    }

    /// Drops the last `plies` moves and rebuilds every position by replaying
    /// the remaining addresses from the start.
    ///
    /// Returns false without touching anything if fewer than `plies` moves
    /// exist.
    ///
    /// # Errors
    ///
    /// A replay failure means a stored move no longer applies, which the line
    /// reports instead of keeping half-rebuilt state.
    pub fn take_back(
        &mut self,
        validator: &dyn Validator,
        plies: usize,
    ) -> Result<bool, MoveRejected> {
        if plies == 0 || self.moves.len() < plies {
            return Ok(false);
        }
        let keep = self.moves.len() - plies;
        let positions = replay(validator, self.start(), self.moves.iter().take(keep))?;
        self.moves.truncate(keep);
        self.positions = positions;
        Ok(true)
    }

    /// Pieces removed from the board so far, grouped by the color of the
    /// captured piece.
    #[must_use]
    pub fn captured(&self) -> CapturedPieces {
        let mut captured = CapturedPieces::default();
        for record in &self.moves {
            if let Some(kind) = record.captured {
                match record.color.opposite() {
                    Color::White => captured.white.push(kind),
                    Color::Black => captured.black.push(kind),
                }
            }
        }
        captured
    }
}

/// Replays `moves` from `start`, returning the start followed by the position
/// after each move.
///
/// # Errors
///
/// Returns the first rejection the validator reports.
pub fn replay<'a>(
    validator: &dyn Validator,
    start: &Position,
    moves: impl IntoIterator<Item = &'a MoveRecord>,
) -> Result<Vec<Position>, MoveRejected> {
    let mut positions = vec![start.clone()];
    let mut current = start.clone();
    for record in moves {
        current = validator.apply_move(&current, &record.address)?.position;
        positions.push(current.clone());
    }
    Ok(positions)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedPieces {
    pub white: Vec<PieceKind>,
    pub black: Vec<PieceKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    StartScreen,
    Initializing,
    PlayerTurn,
    AiThinking,
    GameOver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResultKind {
    Checkmate,
    Stalemate,
    Draw,
    Resignation,
    /// The opponent process failed and the game cannot continue.
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameResult {
    pub kind: ResultKind,
    pub winner: Option<Actor>,
    pub draw_reason: Option<DrawReason>,
    pub detail: Option<String>,
}

impl GameResult {
    #[must_use]
    pub const fn checkmate(winner: Actor) -> Self {
        Self {
            kind: ResultKind::Checkmate,
            winner: Some(winner),
            draw_reason: None,
            detail: None,
        }
    }

    #[must_use]
    pub const fn drawn(reason: DrawReason) -> Self {
        let kind = match reason {
            DrawReason::Stalemate => ResultKind::Stalemate,
            _ => ResultKind::Draw,
        };
        Self {
            kind,
            winner: None,
            draw_reason: Some(reason),
            detail: None,
        }
    }

    #[must_use]
    pub const fn resignation() -> Self {
        Self {
            kind: ResultKind::Resignation,
            winner: Some(Actor::Opponent),
            draw_reason: None,
            detail: None,
        }
    }

    #[must_use]
    pub fn aborted(detail: impl Into<String>) -> Self {
        Self {
            kind: ResultKind::Aborted,
            winner: None,
            draw_reason: None,
            detail: Some(detail.into()),
        }
    }

    /// Derives the result of a game whose last move was made by `mover`, or
    /// `None` if play continues.
    #[must_use]
    pub fn from_classification(classification: &Classification, mover: Actor) -> Option<Self> {
        if classification.checkmate {
            return Some(Self::checkmate(mover));
        }
        match classification.draw {
            Some(reason) => Some(Self::drawn(reason)),
            None => None,
        }
    }

    #[must_use]
    pub fn message(&self) -> String {
        match self.kind {
            ResultKind::Checkmate => match self.winner {
                Some(Actor::Player) => "You win!".to_string(),
                _ => "You lose!".to_string(),
            },
            ResultKind::Stalemate | ResultKind::Draw => match self.draw_reason {
                Some(reason) => format!("Draw: {reason}"),
                None => "Draw".to_string(),
            },
            ResultKind::Resignation => "You resigned".to_string(),
            ResultKind::Aborted => match &self.detail {
                Some(detail) => format!("Game aborted: {detail}"),
                None => "Game aborted".to_string(),
            },
        }
    }
}

/// Read-only view handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub fen: String,
    pub turn: Color,
    pub moves: Vec<MoveRecord>,
    pub player_color: Color,
    pub opponent_color: Color,
    pub difficulty: Option<DifficultyTier>,
    pub is_check: bool,
    pub is_checkmate: bool,
    pub is_stalemate: bool,
    pub is_draw: bool,
    pub draw_reason: Option<DrawReason>,
    pub king_in_check: Option<Square>,
    pub last_move: Option<(Square, Square)>,
    pub captured: CapturedPieces,
    pub result: Option<GameResult>,
    pub result_message: Option<String>,
    pub engine_status: EngineStatus,
}
