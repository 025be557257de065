pub mod engine;
pub mod logic;

pub use engine::config::{DifficultyTier, EngineConfig};
pub use engine::{AdapterSettings, BestMove, EngineAdapter, EngineError, EngineStatus, MoveSource};
pub use logic::game::{Actor, Color, Position};
pub use logic::notation::{MoveDescriptor, PromotionPiece, Square};
pub use logic::rules::{ShakmatyValidator, Validator};
