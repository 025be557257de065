use chess_core::logic::game::SessionSnapshot;
use chess_core::{DifficultyTier, PromotionPiece, Square};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SidePreference {
    White,
    Black,
    Random,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientMessage {
    Start {
        side: SidePreference,
        difficulty: DifficultyTier,
    },
    MakeMove {
        from: Square,
        to: Square,
        promotion: Option<PromotionPiece>,
    },
    LegalMoves {
        square: Option<Square>,
    },
    Undo,
    Resign,
    NewGame,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerMessage {
    State(Box<SessionSnapshot>),
    MoveRejected {
        reason: String,
        promotion_required: bool,
    },
    LegalMoves {
        square: Option<Square>,
        destinations: Vec<Square>,
    },
    UndoResult {
        applied: bool,
    },
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_wire_format() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"MakeMove":{"from":"a7","to":"a8","promotion":"q"}}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::MakeMove {
                from: "a7".parse().unwrap(),
                to: "a8".parse().unwrap(),
                promotion: Some(PromotionPiece::Queen),
            }
        );

        let start: ClientMessage =
            serde_json::from_str(r#"{"Start":{"side":"random","difficulty":"veryHard"}}"#)
                .unwrap();
        assert_eq!(
            start,
            ClientMessage::Start {
                side: SidePreference::Random,
                difficulty: DifficultyTier::VeryHard,
            }
        );
        assert_eq!(
            serde_json::from_str::<ClientMessage>(r#""Undo""#).unwrap(),
            ClientMessage::Undo
        );
    }

    #[test]
    fn test_server_message_wire_format() {
        let json = serde_json::to_string(&ServerMessage::UndoResult { applied: false }).unwrap();
        assert_eq!(json, r#"{"UndoResult":{"applied":false}}"#);
    }
}
