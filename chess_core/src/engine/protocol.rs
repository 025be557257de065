//! The slice of UCI this adapter speaks.

pub const UCI: &str = "uci";
pub const IS_READY: &str = "isready";
pub const STOP: &str = "stop";
pub const QUIT: &str = "quit";

#[must_use]
pub fn position_command(fen: &str) -> String {
    format!("position fen {fen}")
}

#[must_use]
pub fn go_command(move_time_ms: u128) -> String {
    format!("go movetime {move_time_ms}")
}

/// One line of engine output, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineLine {
    UciOk,
    ReadyOk,
    /// First token after `bestmove`, `None` when the line carries no move.
    BestMove(Option<String>),
    Other,
}

#[must_use]
pub fn parse_line(line: &str) -> EngineLine {
    let mut tokens = line.split_whitespace();
    match tokens.next() {
        Some("uciok") => EngineLine::UciOk,
        Some("readyok") => EngineLine::ReadyOk,
        Some("bestmove") => EngineLine::BestMove(tokens.next().map(str::to_string)),
        _ => EngineLine::Other,
    }
}
