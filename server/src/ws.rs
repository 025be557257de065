use crate::game_manager::{AppState, GameSession, SessionError};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use chess_core::Color;
use futures::{sink::SinkExt, stream::StreamExt};
use shared::{ClientMessage, ServerMessage, SidePreference};
use std::sync::Arc;
use tokio::sync::mpsc;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    // Forward outgoing messages to the socket
    let forward = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to encode server message");
                    continue;
                }
            };
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let session_id = uuid::Uuid::new_v4().to_string();
    state.add_connection(&session_id);
    let (mut session, mut replies) = state.open_session(session_id.clone());
    let mut engine_status = session.watch_engine();
    let _ = tx.send(ServerMessage::State(Box::new(session.snapshot())));

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                let Some(Ok(msg)) = incoming else { break };
                match msg {
                    Message::Text(text) => {
                        if !state.check_rate_limit(&session_id) {
                            tracing::warn!(session_id = %session_id, "Rate limited");
                            let _ = tx.send(ServerMessage::Error("Too many messages".to_string()));
                            continue;
                        }
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                let starts_game = matches!(
                                    client_msg,
                                    ClientMessage::Start { .. } | ClientMessage::NewGame
                                );
                                if starts_game
                                    && state.renew_if_engine_down(&mut session, &mut replies).await
                                {
                                    engine_status = session.watch_engine();
                                }
                                for reply in respond(&mut session, client_msg) {
                                    let _ = tx.send(reply);
                                }
                            }
                            Err(e) => {
                                tracing::debug!(session_id = %session_id, error = %e, "Unreadable client message");
                                let _ = tx.send(ServerMessage::Error(format!("Invalid message: {e}")));
                            }
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(reply) = replies.recv() => {
                if let Err(e) = session.handle_opponent_reply(reply) {
                    tracing::warn!(
                        session_id = %session_id,
                        engine_status = %session.adapter_status(),
                        error = %e,
                        "Opponent move failed"
                    );
                    let _ = tx.send(ServerMessage::Error(e.to_string()));
                }
                let _ = tx.send(ServerMessage::State(Box::new(session.snapshot())));
            }
            Ok(()) = engine_status.changed() => {
                tracing::debug!(
                    session_id = %session_id,
                    engine_status = %session.adapter_status(),
                    "Engine status changed"
                );
                let _ = tx.send(ServerMessage::State(Box::new(session.snapshot())));
            }
        }
    }

    session.shutdown().await;
    state.remove_connection(&session_id);
    forward.abort();
}

fn choose_color(side: SidePreference) -> Color {
    match side {
        SidePreference::White => Color::White,
        SidePreference::Black => Color::Black,
        SidePreference::Random => {
            if rand::random::<bool>() {
                Color::White
            } else {
                Color::Black
            }
        }
    }
}

/// Runs one client request against the session and collects the replies.
pub fn respond(session: &mut GameSession, msg: ClientMessage) -> Vec<ServerMessage> {
    let state = |session: &GameSession| ServerMessage::State(Box::new(session.snapshot()));
    match msg {
        ClientMessage::Start { side, difficulty } => {
            session.start(choose_color(side), difficulty);
            vec![state(session)]
        }
        ClientMessage::MakeMove {
            from,
            to,
            promotion,
        } => match session.submit_player_move(from, to, promotion) {
            Ok(_) => vec![state(session)],
            Err(e) => vec![ServerMessage::MoveRejected {
                promotion_required: matches!(e, SessionError::PromotionRequired),
                reason: e.to_string(),
            }],
        },
        ClientMessage::LegalMoves { square } => match session.legal_moves(square) {
            Ok(destinations) => vec![ServerMessage::LegalMoves {
                square,
                destinations,
            }],
            Err(e) => vec![ServerMessage::Error(e.to_string())],
        },
        ClientMessage::Undo => {
            let applied = session.undo();
            vec![ServerMessage::UndoResult { applied }, state(session)]
        }
        ClientMessage::Resign => match session.resign() {
            Ok(()) => vec![state(session)],
            Err(e) => vec![ServerMessage::Error(e.to_string())],
        },
        ClientMessage::NewGame => {
            session.reset();
            vec![state(session)]
        }
    }
}
