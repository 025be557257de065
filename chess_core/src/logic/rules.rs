use crate::logic::game::{CastleSide, Color, MoveFlags, PieceKind, Position};
use crate::logic::notation::{MoveDescriptor, PromotionPiece, Square};
use serde::{Deserialize, Serialize};
use shakmaty::fen::Fen;
use shakmaty::san::SanPlus;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, CastlingSide, Chess, EnPassantMode, File, Rank, Role};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveRejected {
    #[error("invalid position: {0}")]
    InvalidPosition(String),
    #[error("illegal move: {0}")]
    Illegal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DrawReason {
    #[serde(rename = "stalemate")]
    Stalemate,
    #[serde(rename = "repetition")]
    ThreefoldRepetition,
    #[serde(rename = "insufficient")]
    InsufficientMaterial,
    #[serde(rename = "50-move")]
    FiftyMove,
}

impl fmt::Display for DrawReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stalemate => "stalemate",
            Self::ThreefoldRepetition => "repetition",
            Self::InsufficientMaterial => "insufficient",
            Self::FiftyMove => "50-move",
        })
    }
}

/// Terminal and check information for one position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Classification {
    pub check: bool,
    pub checkmate: bool,
    pub stalemate: bool,
    /// First matching reason in the order stalemate, repetition, insufficient
    /// material, fifty-move.
    pub draw: Option<DrawReason>,
    pub king_in_check: Option<Square>,
}

impl Classification {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.checkmate || self.draw.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMove {
    pub position: Position,
    pub san: String,
    pub flags: MoveFlags,
    pub captured: Option<PieceKind>,
}

/// The rules authority. The session never decides legality on its own.
pub trait Validator: Send + Sync {
    /// Destination squares of every legal move, or only of those starting on
    /// `from` when given.
    ///
    /// # Errors
    ///
    /// Fails if `position` cannot be read.
    fn legal_moves(
        &self,
        position: &Position,
        from: Option<Square>,
    ) -> Result<Vec<Square>, MoveRejected>;

    /// # Errors
    ///
    /// [`MoveRejected::Illegal`] when the move is not legal in `position`.
    fn apply_move(
        &self,
        position: &Position,
        mv: &MoveDescriptor,
    ) -> Result<AppliedMove, MoveRejected>;

    /// Classifies `position`. `history` lists every position of the game so
    /// far, `position` included, for repetition counting.
    ///
    /// # Errors
    ///
    /// Fails if `position` cannot be read.
    fn classify(
        &self,
        position: &Position,
        history: &[Position],
    ) -> Result<Classification, MoveRejected>;

    /// True when `from -> to` is a legal pawn move onto the last rank that
    /// still lacks a promotion piece.
    fn requires_promotion(&self, position: &Position, from: Square, to: Square) -> bool;
}

/// Validator backed by `shakmaty`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShakmatyValidator;

const REPETITION_LIMIT: usize = 3;
const FIFTY_MOVE_PLIES: u32 = 100;

impl ShakmatyValidator {
    fn load(position: &Position) -> Result<Chess, MoveRejected> {
        let fen: Fen = position
            .as_fen()
            .parse()
            .map_err(|e| MoveRejected::InvalidPosition(format!("{e}")))?;
        fen.into_position(CastlingMode::Standard)
            .map_err(|e| MoveRejected::InvalidPosition(format!("{e}")))
    }

    fn store(chess: &Chess) -> Result<Position, MoveRejected> {
        let fen = Fen::from_position(chess.clone(), EnPassantMode::Legal).to_string();
        Position::parse(&fen).map_err(|e| MoveRejected::InvalidPosition(format!("{e}")))
    }

    fn to_move(chess: &Chess, mv: &MoveDescriptor) -> Result<shakmaty::Move, MoveRejected> {
        let uci = UciMove::Normal {
            from: to_shakmaty_square(mv.from),
            to: to_shakmaty_square(mv.to),
            promotion: mv.promotion.map(promotion_role),
        };
        uci.to_move(chess)
            .map_err(|_| MoveRejected::Illegal(mv.to_string()))
    }
}

impl Validator for ShakmatyValidator {
    fn legal_moves(
        &self,
        position: &Position,
        from: Option<Square>,
    ) -> Result<Vec<Square>, MoveRejected> {
        use shakmaty::Position as _;

        let chess = Self::load(position)?;
        let mut destinations = Vec::new();
        for m in &chess.legal_moves() {
            if let UciMove::Normal {
                from: origin, to, ..
            } = UciMove::from_move(m, CastlingMode::Standard)
            {
                if from.is_some_and(|sq| to_shakmaty_square(sq) != origin) {
                    continue;
                }
                let Some(target) = from_shakmaty_square(to) else {
                    continue;
                };
                if !destinations.contains(&target) {
                    destinations.push(target);
                }
            }
        }
        Ok(destinations)
    }

    fn apply_move(
        &self,
        position: &Position,
        mv: &MoveDescriptor,
    ) -> Result<AppliedMove, MoveRejected> {
        use shakmaty::Position as _;

        let chess = Self::load(position)?;
        let m = Self::to_move(&chess, mv)?;

        let flags = MoveFlags {
            capture: m.is_capture(),
            promotion: m.promotion().and_then(role_promotion),
            castle_side: m.castling_side().map(|side| match side {
                CastlingSide::KingSide => CastleSide::King,
                CastlingSide::QueenSide => CastleSide::Queen,
            }),
            en_passant: m.is_en_passant(),
            gives_check: false,
        };
        let captured = m.capture().map(role_kind);

        let mut next = chess;
        let san = SanPlus::from_move_and_play_unchecked(&mut next, &m);

        Ok(AppliedMove {
            position: Self::store(&next)?,
            san: san.to_string(),
            flags: MoveFlags {
                gives_check: next.is_check(),
                ..flags
            },
            captured,
        })
    }

    fn classify(
        &self,
        position: &Position,
        history: &[Position],
    ) -> Result<Classification, MoveRejected> {
        use shakmaty::Position as _;

        let chess = Self::load(position)?;
        let check = chess.is_check();
        let checkmate = chess.is_checkmate();
        let stalemate = chess.is_stalemate();

        let key = position.repetition_key();
        let repetitions = history
            .iter()
            .filter(|p| p.repetition_key() == key)
            .count();

        let draw = if checkmate {
            None
        } else if stalemate {
            Some(DrawReason::Stalemate)
        } else if repetitions >= REPETITION_LIMIT {
            Some(DrawReason::ThreefoldRepetition)
        } else if chess.is_insufficient_material() {
            Some(DrawReason::InsufficientMaterial)
        } else if chess.halfmoves() >= FIFTY_MOVE_PLIES {
            Some(DrawReason::FiftyMove)
        } else {
            None
        };

        let king_in_check = if check {
            chess
                .board()
                .king_of(chess.turn())
                .and_then(from_shakmaty_square)
        } else {
            None
        };

        Ok(Classification {
            check,
            checkmate,
            stalemate,
            draw,
            king_in_check,
        })
    }

    fn requires_promotion(&self, position: &Position, from: Square, to: Square) -> bool {
        use shakmaty::Position as _;

        let Ok(chess) = Self::load(position) else {
            return false;
        };
        let Some(piece) = chess.board().piece_at(to_shakmaty_square(from)) else {
            return false;
        };
        let last_rank = match position.turn() {
            Color::White => 7,
            Color::Black => 0,
        };
        if piece.role != Role::Pawn || to.rank() != last_rank {
            return false;
        }
        let with_queen = MoveDescriptor::new(from, to, Some(PromotionPiece::Queen));
        Self::to_move(&chess, &with_queen).is_ok()
    }
}

fn to_shakmaty_square(square: Square) -> shakmaty::Square {
    shakmaty::Square::from_coords(
        File::new(u32::from(square.file())),
        Rank::new(u32::from(square.rank())),
    )
}

fn from_shakmaty_square(square: shakmaty::Square) -> Option<Square> {
    Square::new(square.file() as u8, square.rank() as u8)
}

const fn promotion_role(piece: PromotionPiece) -> Role {
    match piece {
        PromotionPiece::Queen => Role::Queen,
        PromotionPiece::Rook => Role::Rook,
        PromotionPiece::Bishop => Role::Bishop,
        PromotionPiece::Knight => Role::Knight,
    }
}

const fn role_promotion(role: Role) -> Option<PromotionPiece> {
    match role {
        Role::Queen => Some(PromotionPiece::Queen),
        Role::Rook => Some(PromotionPiece::Rook),
        Role::Bishop => Some(PromotionPiece::Bishop),
        Role::Knight => Some(PromotionPiece::Knight),
        Role::Pawn | Role::King => None,
    }
}

const fn role_kind(role: Role) -> PieceKind {
    match role {
        Role::Pawn => PieceKind::Pawn,
        Role::Knight => PieceKind::Knight,
        Role::Bishop => PieceKind::Bishop,
        Role::Rook => PieceKind::Rook,
        Role::Queen => PieceKind::Queen,
        Role::King => PieceKind::King,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::notation::decode;

    fn pos(fen: &str) -> Position {
        Position::parse(fen).unwrap()
    }

    fn sq(s: &str) -> Square {
        s.parse().unwrap()
    }

    fn apply(position: &Position, text: &str) -> Result<AppliedMove, MoveRejected> {
        ShakmatyValidator.apply_move(position, &decode(text).unwrap())
    }

    #[test]
    fn test_rejects_illegal_moves() {
        let start = Position::initial();
        assert!(matches!(apply(&start, "e2e5"), Err(MoveRejected::Illegal(_))));
        assert!(matches!(apply(&start, "e7e5"), Err(MoveRejected::Illegal(_))));
        assert!(matches!(apply(&start, "d1d3"), Err(MoveRejected::Illegal(_))));
    }

    #[test]
    fn test_accepts_pawn_push() {
        let applied = apply(&Position::initial(), "e2e4").unwrap();
        assert_eq!(applied.san, "e4");
        assert_eq!(applied.position.turn(), Color::Black);
        assert_eq!(
            applied.position.as_fen(),
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1"
        );
        assert_eq!(applied.flags, MoveFlags::default());
    }

    #[test]
    fn test_castling_flags() {
        let p = pos("r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w KQkq - 0 1");
        let short = apply(&p, "e1g1").unwrap();
        assert_eq!(short.san, "O-O");
        assert_eq!(short.flags.castle_side, Some(CastleSide::King));

        let long = apply(&p, "e1c1").unwrap();
        assert_eq!(long.flags.castle_side, Some(CastleSide::Queen));
    }

    #[test]
    fn test_en_passant_flags() {
        let p = pos("rnbqkbnr/ppp1pppp/8/3pP3/8/8/PPPP1PPP/RNBQKBNR w KQkq d6 0 3");
        let ep = apply(&p, "e5d6").unwrap();
        assert!(ep.flags.en_passant);
        assert!(ep.flags.capture);
        assert_eq!(ep.captured, Some(PieceKind::Pawn));
        assert_eq!(ep.san, "exd6");
    }

    #[test]
    fn test_promotion_required_and_applied() {
        let p = pos("4k3/P7/8/8/8/8/8/4K3 w - - 0 1");
        let validator = ShakmatyValidator;
        assert!(validator.requires_promotion(&p, sq("a7"), sq("a8")));
        assert!(!validator.requires_promotion(&p, sq("e1"), sq("e2")));
        assert!(apply(&p, "a7a8").is_err());

        let promoted = apply(&p, "a7a8q").unwrap();
        assert_eq!(promoted.flags.promotion, Some(PromotionPiece::Queen));
        assert!(promoted.position.as_fen().starts_with("Q3k3/"));
        assert!(promoted.flags.gives_check);
        assert_eq!(promoted.san, "a8=Q+");
    }

    #[test]
    fn test_legal_moves_for_square() {
        let validator = ShakmatyValidator;
        let start = Position::initial();
        let mut knight = validator.legal_moves(&start, Some(sq("g1"))).unwrap();
        knight.sort();
        assert_eq!(knight, vec![sq("f3"), sq("h3")]);

        assert_eq!(validator.legal_moves(&start, None).unwrap().len(), 16);
        assert!(validator
            .legal_moves(&start, Some(sq("e4")))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_promotion_destinations_are_listed_once() {
        let p = pos("4k3/P7/8/8/8/8/8/4K3 w - - 0 1");
        let dests = ShakmatyValidator.legal_moves(&p, Some(sq("a7"))).unwrap();
        assert_eq!(dests, vec![sq("a8")]);
    }

    #[test]
    fn test_classify_checkmate() {
        // fool's mate
        let p = pos("rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3");
        let c = ShakmatyValidator.classify(&p, &[p.clone()]).unwrap();
        assert!(c.check);
        assert!(c.checkmate);
        assert!(c.is_terminal());
        assert_eq!(c.draw, None);
        assert_eq!(c.king_in_check, Some(sq("e1")));
    }

    #[test]
    fn test_classify_stalemate() {
        let p = pos("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1");
        let c = ShakmatyValidator.classify(&p, &[p.clone()]).unwrap();
        assert!(c.stalemate);
        assert!(!c.check);
        assert_eq!(c.draw, Some(DrawReason::Stalemate));
    }

    #[test]
    fn test_classify_insufficient_material() {
        let p = pos("8/8/4k3/8/8/3K4/8/8 w - - 0 1");
        let c = ShakmatyValidator.classify(&p, &[p.clone()]).unwrap();
        assert_eq!(c.draw, Some(DrawReason::InsufficientMaterial));
    }

    #[test]
    fn test_classify_fifty_move() {
        let p = pos("4k3/8/8/8/8/8/R7/4K3 w - - 100 80");
        let c = ShakmatyValidator.classify(&p, &[p.clone()]).unwrap();
        assert_eq!(c.draw, Some(DrawReason::FiftyMove));

        let fresh = pos("4k3/8/8/8/8/8/R7/4K3 w - - 99 80");
        let c = ShakmatyValidator.classify(&fresh, &[fresh.clone()]).unwrap();
        assert_eq!(c.draw, None);
    }

    #[test]
    fn test_invalid_position_is_reported() {
        let broken = pos("8/8/8/8/8/8/8/8 w - - 0 1");
        assert!(matches!(
            ShakmatyValidator.classify(&broken, &[]),
            Err(MoveRejected::InvalidPosition(_))
        ));
        assert!(!ShakmatyValidator.requires_promotion(&broken, sq("a7"), sq("a8")));
    }
}
