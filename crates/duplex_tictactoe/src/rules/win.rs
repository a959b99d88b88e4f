//! Win detection logic for tic-tac-toe.

use crate::{Board, Mark, Square};
use tracing::instrument;

/// The eight winning lines as `(row, col)` triples: rows, columns, diagonals.
pub const LINES: [[(usize, usize); 3]; 8] = [
    // Rows
    [(0, 0), (0, 1), (0, 2)],
    [(1, 0), (1, 1), (1, 2)],
    [(2, 0), (2, 1), (2, 2)],
    // Columns
    [(0, 0), (1, 0), (2, 0)],
    [(0, 1), (1, 1), (2, 1)],
    [(0, 2), (1, 2), (2, 2)],
    // Diagonals
    [(0, 0), (1, 1), (2, 2)],
    [(0, 2), (1, 1), (2, 0)],
];

/// Checks if there is a winner on the board.
///
/// Returns the mark owning the first complete line in [`LINES`] order,
/// `None` otherwise.
#[instrument(skip(board))]
pub fn check_winner(board: &Board) -> Option<Mark> {
    for [a, b, c] in LINES {
        let sq = board.get(a.0, a.1);
        if sq == board.get(b.0, b.1)
            && sq == board.get(c.0, c.1)
            && let Some(Square::Occupied(mark)) = sq
        {
            return Some(mark);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board_with(cells: &[(usize, usize, Mark)]) -> Board {
        let mut board = Board::new();
        for &(row, col, mark) in cells {
            board.set(row, col, Square::Occupied(mark)).unwrap();
        }
        board
    }

    #[test]
    fn test_no_winner_empty_board() {
        assert_eq!(check_winner(&Board::new()), None);
    }

    #[test]
    fn test_winner_top_row() {
        let board = board_with(&[(0, 0, Mark::X), (0, 1, Mark::X), (0, 2, Mark::X)]);
        assert_eq!(check_winner(&board), Some(Mark::X));
    }

    #[test]
    fn test_winner_column() {
        let board = board_with(&[(0, 1, Mark::O), (1, 1, Mark::O), (2, 1, Mark::O)]);
        assert_eq!(check_winner(&board), Some(Mark::O));
    }

    #[test]
    fn test_winner_anti_diagonal() {
        let board = board_with(&[(0, 2, Mark::O), (1, 1, Mark::O), (2, 0, Mark::O)]);
        assert_eq!(check_winner(&board), Some(Mark::O));
    }

    #[test]
    fn test_no_winner_mixed_line() {
        let board = board_with(&[(0, 0, Mark::X), (0, 1, Mark::O), (0, 2, Mark::X)]);
        assert_eq!(check_winner(&board), None);
    }

    #[test]
    fn test_every_line_detected() {
        for line in LINES {
            let cells: Vec<_> = line.iter().map(|&(r, c)| (r, c, Mark::X)).collect();
            assert_eq!(check_winner(&board_with(&cells)), Some(Mark::X), "{line:?}");
        }
    }
}
