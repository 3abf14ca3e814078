//! Five-in-a-row detection
//!
//! Only lines through the last placed stone are examined, so the check is
//! O(board size) per move.

use super::{Board, Move, Stone, WIN_LENGTH};

/// Horizontal, vertical, diagonal down-right and diagonal down-left
const AXES: [(i32, i32); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];

/// Return the stone at `mv` if it is part of a run of at least
/// [`WIN_LENGTH`] equal stones along any single axis.
pub fn evaluate(board: &Board, mv: Move) -> Option<Stone> {
    let stone = board.get(mv.x, mv.y)?;

    AXES.iter()
        .any(|&(dx, dy)| run_length(board, mv, stone, dx, dy) >= WIN_LENGTH)
        .then_some(stone)
}

/// Length of the contiguous run of `stone` through `mv` along (dx, dy)
fn run_length(board: &Board, mv: Move, stone: Stone, dx: i32, dy: i32) -> usize {
    1 + extend(board, mv, stone, dx, dy) + extend(board, mv, stone, -dx, -dy)
}

fn extend(board: &Board, mv: Move, stone: Stone, dx: i32, dy: i32) -> usize {
    let mut count = 0;
    let (mut x, mut y) = (mv.x + dx, mv.y + dy);
    while board.get(x, y) == Some(stone) {
        count += 1;
        x += dx;
        y += dy;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board_with(stones: &[(i32, i32)], stone: Stone) -> Board {
        let mut board = Board::new(10);
        for &(x, y) in stones {
            board.place(Move::new(x, y), stone).unwrap();
        }
        board
    }

    #[test]
    fn test_empty_board_has_no_winner() {
        let board = Board::new(10);
        for x in 0..10 {
            for y in 0..10 {
                assert_eq!(evaluate(&board, Move::new(x, y)), None);
            }
        }
        assert_eq!(evaluate(&board, Move::new(-1, 20)), None);
    }

    #[test]
    fn test_horizontal_run() {
        let board = board_with(&[(3, 2), (3, 3), (3, 4), (3, 5), (3, 6)], Stone::Black);
        assert_eq!(evaluate(&board, Move::new(3, 4)), Some(Stone::Black));
        assert_eq!(evaluate(&board, Move::new(3, 6)), Some(Stone::Black));
    }

    #[test]
    fn test_vertical_run_along_edge() {
        let board = board_with(&[(5, 0), (6, 0), (7, 0), (8, 0), (9, 0)], Stone::White);
        assert_eq!(evaluate(&board, Move::new(9, 0)), Some(Stone::White));
    }

    #[test]
    fn test_both_diagonals() {
        let down_right = board_with(&[(0, 0), (1, 1), (2, 2), (3, 3), (4, 4)], Stone::Black);
        assert_eq!(evaluate(&down_right, Move::new(2, 2)), Some(Stone::Black));

        let down_left = board_with(&[(0, 9), (1, 8), (2, 7), (3, 6), (4, 5)], Stone::White);
        assert_eq!(evaluate(&down_left, Move::new(0, 9)), Some(Stone::White));
    }

    #[test]
    fn test_four_is_not_enough() {
        let board = board_with(&[(0, 0), (0, 1), (0, 2), (0, 3)], Stone::Black);
        assert_eq!(evaluate(&board, Move::new(0, 3)), None);
    }

    #[test]
    fn test_overline_counts() {
        let board = board_with(&[(2, 0), (2, 1), (2, 2), (2, 3), (2, 4), (2, 5)], Stone::Black);
        assert_eq!(evaluate(&board, Move::new(2, 5)), Some(Stone::Black));
    }

    #[test]
    fn test_broken_or_mixed_run() {
        let mut board = board_with(&[(4, 0), (4, 1), (4, 3), (4, 4)], Stone::Black);
        board.place(Move::new(4, 2), Stone::White).unwrap();
        assert_eq!(evaluate(&board, Move::new(4, 4)), None);
        assert_eq!(evaluate(&board, Move::new(4, 2)), None);
    }

    #[test]
    fn test_run_must_pass_through_coordinate() {
        let mut board = board_with(&[(0, 0), (0, 1), (0, 2), (0, 3), (0, 4)], Stone::Black);
        board.place(Move::new(5, 5), Stone::Black).unwrap();
        assert_eq!(evaluate(&board, Move::new(5, 5)), None);
    }

    #[test]
    fn test_axes_are_independent() {
        // Three across plus two down through the same stone is not five
        let board = board_with(&[(5, 3), (5, 4), (5, 5), (6, 5), (7, 5)], Stone::White);
        assert_eq!(evaluate(&board, Move::new(5, 5)), None);
    }
}
