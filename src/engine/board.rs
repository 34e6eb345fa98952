//! Board representation for the fixed 3×3 grid

use crate::types::Symbol;
use serde::{Deserialize, Serialize};

/// Number of rows and columns on the board
pub const BOARD_SIZE: usize = 3;

/// A single board cell
///
/// Serialized as `""`, `"X"` or `"O"` so clients receive the board as a plain
/// nested string array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Cell {
    #[default]
    Empty,
    Mark(Symbol),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    pub fn symbol(&self) -> Option<Symbol> {
        match self {
            Cell::Empty => None,
            Cell::Mark(symbol) => Some(*symbol),
        }
    }
}

impl From<Cell> for String {
    fn from(cell: Cell) -> Self {
        match cell {
            Cell::Empty => String::new(),
            Cell::Mark(symbol) => symbol.as_str().to_string(),
        }
    }
}

impl TryFrom<String> for Cell {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "" => Ok(Cell::Empty),
            "X" => Ok(Cell::Mark(Symbol::X)),
            "O" => Ok(Cell::Mark(Symbol::O)),
            other => Err(format!("Invalid cell value: {:?}", other)),
        }
    }
}

/// Row/column position on the board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    pub row: usize,
    pub col: usize,
}

impl Coordinate {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// Convert signed client input into a coordinate, if it lies on the board
    pub fn checked(row: i64, col: i64) -> Option<Self> {
        let size = BOARD_SIZE as i64;
        if (0..size).contains(&row) && (0..size).contains(&col) {
            Some(Self::new(row as usize, col as usize))
        } else {
            None
        }
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Immutable-by-convention board snapshot
///
/// Moves never mutate a board in place; `with_mark` returns the successor.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Board {
    cells: [[Cell; BOARD_SIZE]; BOARD_SIZE],
}

impl Board {
    /// Create an empty board
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a board from three row strings using `X`, `O` and `.` or ` ` for empty
    pub fn from_rows(rows: [&str; BOARD_SIZE]) -> Option<Self> {
        let mut board = Self::new();
        for (r, row) in rows.iter().enumerate() {
            let chars: Vec<char> = row.chars().collect();
            if chars.len() != BOARD_SIZE {
                return None;
            }
            for (c, ch) in chars.into_iter().enumerate() {
                board.cells[r][c] = match ch {
                    'X' => Cell::Mark(Symbol::X),
                    'O' => Cell::Mark(Symbol::O),
                    '.' | ' ' => Cell::Empty,
                    _ => return None,
                };
            }
        }
        Some(board)
    }

    pub fn get(&self, at: Coordinate) -> Cell {
        self.cells[at.row][at.col]
    }

    pub fn is_empty_at(&self, at: Coordinate) -> bool {
        self.get(at).is_empty()
    }

    /// Return a copy of this board with `symbol` placed at `at`
    pub fn with_mark(&self, at: Coordinate, symbol: Symbol) -> Self {
        debug_assert!(self.is_empty_at(at), "cell {} already occupied", at);
        let mut next = self.clone();
        next.cells[at.row][at.col] = Cell::Mark(symbol);
        next
    }

    pub fn rows(&self) -> &[[Cell; BOARD_SIZE]; BOARD_SIZE] {
        &self.cells
    }

    /// Number of non-empty cells
    pub fn occupied_count(&self) -> usize {
        self.cells
            .iter()
            .flatten()
            .filter(|cell| !cell.is_empty())
            .count()
    }

    pub fn is_full(&self) -> bool {
        self.occupied_count() == BOARD_SIZE * BOARD_SIZE
    }

    /// All coordinates that are still empty, in row-major order
    pub fn empty_cells(&self) -> Vec<Coordinate> {
        let mut empty = Vec::new();
        for row in 0..BOARD_SIZE {
            for col in 0..BOARD_SIZE {
                let at = Coordinate::new(row, col);
                if self.is_empty_at(at) {
                    empty.push(at);
                }
            }
        }
        empty
    }
}

impl std::fmt::Display for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, row) in self.cells.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            for cell in row {
                match cell {
                    Cell::Empty => write!(f, ".")?,
                    Cell::Mark(symbol) => write!(f, "{}", symbol)?,
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_board_is_empty() {
        let board = Board::new();
        assert_eq!(board.occupied_count(), 0);
        assert!(!board.is_full());
        assert_eq!(board.empty_cells().len(), 9);
    }

    #[test]
    fn test_with_mark_leaves_original_untouched() {
        let board = Board::new();
        let next = board.with_mark(Coordinate::new(1, 2), Symbol::O);

        assert!(board.is_empty_at(Coordinate::new(1, 2)));
        assert_eq!(next.get(Coordinate::new(1, 2)), Cell::Mark(Symbol::O));
        assert_eq!(next.occupied_count(), 1);
    }

    #[test]
    fn test_from_rows() {
        let board = Board::from_rows(["XO.", "...", "..X"]).unwrap();
        assert_eq!(board.get(Coordinate::new(0, 0)), Cell::Mark(Symbol::X));
        assert_eq!(board.get(Coordinate::new(0, 1)), Cell::Mark(Symbol::O));
        assert_eq!(board.get(Coordinate::new(2, 2)), Cell::Mark(Symbol::X));
        assert_eq!(board.to_string(), "XO.\n...\n..X");

        assert!(Board::from_rows(["XO", "...", "..."]).is_none());
        assert!(Board::from_rows(["XOZ", "...", "..."]).is_none());
    }

    #[test]
    fn test_checked_coordinates() {
        assert_eq!(Coordinate::checked(0, 2), Some(Coordinate::new(0, 2)));
        assert_eq!(Coordinate::checked(-1, 0), None);
        assert_eq!(Coordinate::checked(1, 3), None);
    }

    #[test]
    fn test_board_serializes_as_string_grid() {
        let board = Board::from_rows(["X..", ".O.", "..."]).unwrap();
        let json = serde_json::to_value(&board).unwrap();
        assert_eq!(
            json,
            serde_json::json!([["X", "", ""], ["", "O", ""], ["", "", ""]])
        );

        let parsed: Board = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, board);
    }
}
