//! Game module - Board model and rules for omok
//!
//! Provides:
//! - The board grid and move validation
//! - Five-in-a-row detection for the last placed stone

mod board;
pub mod win;

pub use board::*;
pub use win::evaluate;

/// Default board edge length
pub const DEFAULT_BOARD_SIZE: usize = 10;

/// Stones in a row needed to win
pub const WIN_LENGTH: usize = 5;
