//! Win and draw detection

use crate::engine::board::{Board, Coordinate};
use crate::types::Symbol;
use serde::{Deserialize, Serialize};

/// Every line that wins the game, in scan priority order:
/// rows top to bottom, columns left to right, main diagonal, anti diagonal.
pub const WINNING_LINES: [[Coordinate; 3]; 8] = [
    [Coordinate::new(0, 0), Coordinate::new(0, 1), Coordinate::new(0, 2)],
    [Coordinate::new(1, 0), Coordinate::new(1, 1), Coordinate::new(1, 2)],
    [Coordinate::new(2, 0), Coordinate::new(2, 1), Coordinate::new(2, 2)],
    [Coordinate::new(0, 0), Coordinate::new(1, 0), Coordinate::new(2, 0)],
    [Coordinate::new(0, 1), Coordinate::new(1, 1), Coordinate::new(2, 1)],
    [Coordinate::new(0, 2), Coordinate::new(1, 2), Coordinate::new(2, 2)],
    [Coordinate::new(0, 0), Coordinate::new(1, 1), Coordinate::new(2, 2)],
    [Coordinate::new(0, 2), Coordinate::new(1, 1), Coordinate::new(2, 0)],
];

/// Three equal marks in a line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinningLine {
    pub symbol: Symbol,
    pub line: [Coordinate; 3],
}

/// Find the first complete line on the board, if any
pub fn check_winner(board: &Board) -> Option<WinningLine> {
    WINNING_LINES.iter().find_map(|line| {
        let first = board.get(line[0]).symbol()?;
        let complete = line[1..]
            .iter()
            .all(|at| board.get(*at).symbol() == Some(first));
        complete.then_some(WinningLine {
            symbol: first,
            line: *line,
        })
    })
}

/// Whether every cell is occupied
pub fn is_board_full(board: &Board) -> bool {
    board.is_full()
}

/// A full board without a winning line
pub fn is_draw(board: &Board) -> bool {
    check_winner(board).is_none() && is_board_full(board)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board(rows: [&str; 3]) -> Board {
        Board::from_rows(rows).unwrap()
    }

    #[test]
    fn test_empty_board_has_no_winner() {
        assert!(check_winner(&Board::new()).is_none());
        assert!(!is_draw(&Board::new()));
    }

    #[test]
    fn test_row_win() {
        let result = check_winner(&board(["XXX", "OO.", "..."])).unwrap();
        assert_eq!(result.symbol, Symbol::X);
        assert_eq!(result.line, WINNING_LINES[0]);
    }

    #[test]
    fn test_column_win() {
        let result = check_winner(&board(["XO.", "XO.", ".OX"])).unwrap();
        assert_eq!(result.symbol, Symbol::O);
        assert_eq!(
            result.line,
            [
                Coordinate::new(0, 1),
                Coordinate::new(1, 1),
                Coordinate::new(2, 1)
            ]
        );
    }

    #[test]
    fn test_diagonal_wins() {
        let main = check_winner(&board(["XO.", "OX.", "..X"])).unwrap();
        assert_eq!(main.line, WINNING_LINES[6]);

        let anti = check_winner(&board(["XXO", "XO.", "O.."])).unwrap();
        assert_eq!(anti.symbol, Symbol::O);
        assert_eq!(anti.line, WINNING_LINES[7]);
    }

    #[test]
    fn test_two_in_a_row_is_not_a_win() {
        assert!(check_winner(&board(["XX.", "OO.", "..."])).is_none());
        assert!(check_winner(&board(["XOX", "OXO", "O.."])).is_none());
    }

    #[test]
    fn test_priority_order_is_deterministic() {
        // Not reachable through alternating play, but the scan order still decides
        let result = check_winner(&board(["XXX", "X..", "X.."])).unwrap();
        assert_eq!(result.line, WINNING_LINES[0]);
    }

    #[test]
    fn test_draw_detection() {
        let full = board(["XOX", "XOO", "OXX"]);
        assert!(is_board_full(&full));
        assert!(check_winner(&full).is_none());
        assert!(is_draw(&full));

        let full_with_winner = board(["XXX", "OOX", "XOO"]);
        assert!(is_board_full(&full_with_winner));
        assert!(!is_draw(&full_with_winner));
    }
}
