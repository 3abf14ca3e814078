//! Local command parsing
//!
//! ```text
//! \exit            leave the match
//! \resign | \gg    concede
//! x y | \\ x y     place a stone at row x, column y
//! anything else    chat
//! ```

use thiserror::Error;

use crate::game::{Move, MoveError};
use crate::protocol::CodecError;

/// Errors reported back to the local player. None of them change the match.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("invalid command: {0}")]
    Malformed(String),

    #[error("game is already finished")]
    AlreadyFinished,

    #[error("not your turn")]
    NotYourTurn,

    #[error("invalid move: {0}")]
    InvalidMove(#[from] MoveError),

    #[error("cannot send message: {0}")]
    Message(#[from] CodecError),

    #[error("opponent is no longer reachable")]
    PeerLost,
}

/// Something the local player asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalCommand {
    Exit,
    Resign,
    Move(Move),
    Chat(String),
}

impl LocalCommand {
    /// Parse one input line. Blank input yields `Ok(None)`.
    pub fn parse(input: &str) -> Result<Option<Self>, CommandError> {
        let text = input.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let tokens: Vec<&str> = text.split_whitespace().collect();

        match tokens[0] {
            "\\exit" => return Ok(Some(LocalCommand::Exit)),
            "\\resign" | "\\gg" => return Ok(Some(LocalCommand::Resign)),
            "\\\\" => {
                return parse_coordinates(&tokens[1..])
                    .map(|mv| Some(LocalCommand::Move(mv)))
                    .ok_or_else(|| CommandError::Malformed("usage: \\\\ <x> <y>".to_string()));
            }
            cmd if cmd.starts_with('\\') => {
                return Err(CommandError::Malformed(format!("unknown command {}", cmd)));
            }
            _ => {}
        }

        if let Some(mv) = parse_coordinates(&tokens) {
            return Ok(Some(LocalCommand::Move(mv)));
        }

        // Chat keeps the line as typed, minus its terminator
        let line = input.trim_end_matches(&['\r', '\n'][..]);
        Ok(Some(LocalCommand::Chat(line.to_string())))
    }
}

fn parse_coordinates(tokens: &[&str]) -> Option<Move> {
    match tokens {
        [x, y] => Some(Move::new(x.parse().ok()?, y.parse().ok()?)),
        _ => None,
    }
}
