//! Match status bookkeeping

use std::fmt;

/// Outcome of a match from the local player's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Playing,
    Win,
    Lose,
    Draw,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Status::Playing)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Status::Playing => "playing",
            Status::Win => "you win",
            Status::Lose => "you lose",
            Status::Draw => "draw",
        };
        f.write_str(text)
    }
}

/// Why a match ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FinishReason {
    /// Five in a row (by whichever side the status says)
    FiveInARow,
    BoardFull,
    /// Local player resigned
    Resigned,
    /// Local player left with `\exit`
    Exited,
    /// Local player ran out of time
    TimedOut,
    OpponentResigned,
    OpponentExited,
    OpponentTimedOut,
    /// Socket failure towards the opponent
    OpponentUnreachable,
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FinishReason::FiveInARow => "five in a row",
            FinishReason::BoardFull => "the board is full",
            FinishReason::Resigned => "you resigned",
            FinishReason::Exited => "you left the match",
            FinishReason::TimedOut => "time over",
            FinishReason::OpponentResigned => "opponent gave up",
            FinishReason::OpponentExited => "opponent exited",
            FinishReason::OpponentTimedOut => "opponent ran out of time",
            FinishReason::OpponentUnreachable => "opponent is unreachable",
        };
        f.write_str(text)
    }
}

/// Turn and move counters plus the current status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchState {
    turn_index: u32,
    moves_played: u32,
    status: Status,
}

impl Default for MatchState {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchState {
    pub fn new() -> Self {
        Self {
            turn_index: 0,
            moves_played: 0,
            status: Status::Playing,
        }
    }

    pub fn turn_index(&self) -> u32 {
        self.turn_index
    }

    pub fn moves_played(&self) -> u32 {
        self.moves_played
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_playing(&self) -> bool {
        self.status == Status::Playing
    }

    pub(crate) fn record_move(&mut self) {
        self.moves_played += 1;
    }

    pub(crate) fn advance_turn(&mut self) {
        self.turn_index += 1;
    }

    /// Leave `Playing` for a terminal status. Only the first call has an
    /// effect; returns whether this call changed the status.
    pub(crate) fn finish(&mut self, status: Status) -> bool {
        if !self.is_playing() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let state = MatchState::new();
        assert_eq!(state.turn_index(), 0);
        assert_eq!(state.moves_played(), 0);
        assert!(state.is_playing());
    }

    #[test]
    fn test_finish_happens_once() {
        let mut state = MatchState::new();
        assert!(!state.finish(Status::Playing));
        assert!(state.finish(Status::Win));
        assert!(!state.finish(Status::Lose));
        assert_eq!(state.status(), Status::Win);
    }
}
