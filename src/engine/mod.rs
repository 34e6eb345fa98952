//! Move engine for the fixed 3×3, three-in-a-row game
//!
//! Everything in this module is synchronous pure computation over board and
//! session snapshots. Committing results and notifying participants is the
//! caller's job.

pub mod board;
pub mod moves;
pub mod rules;

// Re-export commonly used types
pub use board::{Board, Cell, Coordinate, BOARD_SIZE};
pub use moves::{apply_move, apply_move_at, MoveOutcome, MoveRecord, Terminal};
pub use rules::{check_winner, is_board_full, is_draw, WinningLine, WINNING_LINES};
