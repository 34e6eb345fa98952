//! Move validation and application
//!
//! `apply_move` is a pure function over a session snapshot. It never mutates
//! the session it is given; the session registry commits the returned outcome.

use crate::engine::board::{Board, Coordinate};
use crate::engine::rules::check_winner;
use crate::error::MoveError;
use crate::session::instance::{Session, SessionStatus};
use crate::types::{ParticipantId, Symbol};
use crate::utils::current_timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One accepted move, as appended to a session's move log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRecord {
    pub participant_id: ParticipantId,
    pub symbol: Symbol,
    pub row: usize,
    pub col: usize,
    pub applied_at: DateTime<Utc>,
}

impl MoveRecord {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.row, self.col)
    }
}

/// How a game ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Terminal {
    pub winner_symbol: Option<Symbol>,
    pub winning_line: Option<[Coordinate; 3]>,
    pub is_draw: bool,
}

/// Result of applying a valid move
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    pub board: Board,
    pub next_turn: Symbol,
    pub terminal: Option<Terminal>,
    pub move_record: MoveRecord,
}

impl MoveOutcome {
    pub fn is_terminal(&self) -> bool {
        self.terminal.is_some()
    }
}

/// Validate and apply a move, stamping it with the current time
pub fn apply_move(
    session: &Session,
    actor_id: &str,
    row: i64,
    col: i64,
) -> Result<MoveOutcome, MoveError> {
    apply_move_at(session, actor_id, row, col, current_timestamp())
}

/// Validate and apply a move at an explicit instant
///
/// Checks run in a fixed order and the first failure wins: participation,
/// session status, bounds, turn, occupancy.
pub fn apply_move_at(
    session: &Session,
    actor_id: &str,
    row: i64,
    col: i64,
    now: DateTime<Utc>,
) -> Result<MoveOutcome, MoveError> {
    let actor = session
        .participant(actor_id)
        .ok_or(MoveError::NotParticipant)?;

    if session.status != SessionStatus::Active {
        return Err(MoveError::SessionNotActive);
    }

    let at = Coordinate::checked(row, col).ok_or(MoveError::OutOfBounds)?;

    if actor.symbol != session.turn {
        return Err(MoveError::NotYourTurn);
    }

    if !session.board.is_empty_at(at) {
        return Err(MoveError::CellOccupied);
    }

    let board = session.board.with_mark(at, actor.symbol);

    let terminal = match check_winner(&board) {
        Some(win) => Some(Terminal {
            winner_symbol: Some(win.symbol),
            winning_line: Some(win.line),
            is_draw: false,
        }),
        None if board.is_full() => Some(Terminal {
            winner_symbol: None,
            winning_line: None,
            is_draw: true,
        }),
        None => None,
    };

    let next_turn = if terminal.is_some() {
        session.turn
    } else {
        session.turn.opposite()
    };

    Ok(MoveOutcome {
        board,
        next_turn,
        terminal,
        move_record: MoveRecord {
            participant_id: actor.participant_id.clone(),
            symbol: actor.symbol,
            row: at.row,
            col: at.col,
            applied_at: now,
        },
    })
}
