//! Board grid and move validation

use std::fmt;
use thiserror::Error;

use super::DEFAULT_BOARD_SIZE;

/// Stone colors; black belongs to the player who moves first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stone {
    Black,
    White,
}

impl Stone {
    pub fn opposite(self) -> Self {
        match self {
            Stone::Black => Stone::White,
            Stone::White => Stone::Black,
        }
    }

    /// Character used when rendering the board
    pub fn symbol(self) -> char {
        match self {
            Stone::Black => 'O',
            Stone::White => '@',
        }
    }
}

/// A placement request; `x` is the row, `y` the column.
///
/// Coordinates are signed so that negative input (local or from the wire)
/// surfaces as [`MoveError::OutOfBounds`] instead of a parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Move {
    pub x: i32,
    pub y: i32,
}

impl Move {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Move validation errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveError {
    #[error("({x}, {y}) is out of bounds for a {size}x{size} board")]
    OutOfBounds { x: i32, y: i32, size: usize },

    #[error("({x}, {y}) is already occupied")]
    Occupied { x: i32, y: i32 },
}

/// Square grid of cells. A cell, once filled, never changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    size: usize,
    cells: Vec<Option<Stone>>,
}

impl Default for Board {
    fn default() -> Self {
        Self::new(DEFAULT_BOARD_SIZE)
    }
}

impl Board {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            cells: vec![None; size * size],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        let size = self.size as i64;
        let (x, y) = (x as i64, y as i64);
        if x < 0 || y < 0 || x >= size || y >= size {
            return None;
        }
        Some((x * size + y) as usize)
    }

    /// Stone at (x, y); `None` for empty or out-of-range cells
    pub fn get(&self, x: i32, y: i32) -> Option<Stone> {
        self.index(x, y).and_then(|i| self.cells[i])
    }

    /// Check that a move targets an empty in-bounds cell
    pub fn validate(&self, mv: Move) -> Result<(), MoveError> {
        match self.index(mv.x, mv.y) {
            None => Err(MoveError::OutOfBounds {
                x: mv.x,
                y: mv.y,
                size: self.size,
            }),
            Some(i) if self.cells[i].is_some() => Err(MoveError::Occupied { x: mv.x, y: mv.y }),
            Some(_) => Ok(()),
        }
    }

    /// Place a stone after validating the move
    pub fn place(&mut self, mv: Move, stone: Stone) -> Result<(), MoveError> {
        self.validate(mv)?;
        if let Some(i) = self.index(mv.x, mv.y) {
            self.cells[i] = Some(stone);
        }
        Ok(())
    }

    pub fn stone_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    pub fn is_full(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "-".repeat(2 * self.size + 3);

        write!(f, "    ")?;
        for y in 0..self.size {
            write!(f, "{:>2}", y)?;
        }
        writeln!(f)?;
        writeln!(f, "   {}", rule)?;

        for x in 0..self.size {
            write!(f, "{:>2} |", x)?;
            for y in 0..self.size {
                let symbol = self.get(x as i32, y as i32).map_or('+', Stone::symbol);
                write!(f, " {}", symbol)?;
            }
            writeln!(f, " |")?;
        }

        writeln!(f, "   {}", rule)
    }
}
