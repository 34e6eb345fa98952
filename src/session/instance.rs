//! Session instance implementation and lifecycle transitions
//!
//! This module contains the session data model and the state transitions
//! that the registry drives: joining an invite, committing moves, completing
//! and abandoning.

use crate::engine::{Board, Coordinate, MoveOutcome, MoveRecord};
use crate::error::{MatchmakingError, Result};
use crate::types::{GameResult, Participant, ParticipantId, SessionId, Symbol, TransportHandle};
use crate::utils::{current_timestamp, generate_session_id, is_idle};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Possible states of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Invite created, waiting for the second participant
    Waiting,
    /// Both seats filled, moves accepted
    Active,
    /// Game concluded by a win or a draw (terminal state)
    Completed,
    /// Game concluded by inactivity (terminal state)
    Abandoned,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Abandoned)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Waiting => "waiting",
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Abandoned => "abandoned",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A participant occupying one of the two seats
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatedParticipant {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub symbol: Symbol,
    pub transport_handle: TransportHandle,
}

impl SeatedParticipant {
    fn seat(participant: Participant, symbol: Symbol) -> Self {
        Self {
            participant_id: participant.participant_id,
            display_name: participant.display_name,
            symbol,
            transport_handle: participant.transport_handle,
        }
    }
}

/// Final result of a completed session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub winner_participant_id: Option<ParticipantId>,
    pub winner_symbol: Option<Symbol>,
    pub winning_line: Option<[Coordinate; 3]>,
    pub is_draw: bool,
}

/// One two-party game instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub status: SessionStatus,
    pub participants: Vec<SeatedParticipant>,
    pub board: Board,
    pub turn: Symbol,
    pub move_log: Vec<MoveRecord>,
    pub outcome: Option<Outcome>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_activity_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Number of seats in every session
pub const SEATS: usize = 2;

impl Session {
    fn empty(status: SessionStatus, participants: Vec<SeatedParticipant>) -> Self {
        let now = current_timestamp();
        Self {
            id: generate_session_id(),
            status,
            participants,
            board: Board::new(),
            turn: Symbol::X,
            move_log: Vec::new(),
            outcome: None,
            created_at: now,
            started_at: (status == SessionStatus::Active).then_some(now),
            last_activity_at: now,
            completed_at: None,
        }
    }

    /// Create an active session with both seats filled
    pub fn new_paired(first: Participant, first_symbol: Symbol, second: Participant) -> Self {
        let participants = vec![
            SeatedParticipant::seat(first, first_symbol),
            SeatedParticipant::seat(second, first_symbol.opposite()),
        ];
        Self::empty(SessionStatus::Active, participants)
    }

    /// Create a waiting session with only the creator seated
    pub fn new_invite(creator: Participant, creator_symbol: Symbol) -> Self {
        let participants = vec![SeatedParticipant::seat(creator, creator_symbol)];
        Self::empty(SessionStatus::Waiting, participants)
    }

    pub fn participant(&self, participant_id: &str) -> Option<&SeatedParticipant> {
        self.participants
            .iter()
            .find(|p| p.participant_id == participant_id)
    }

    pub fn participant_by_symbol(&self, symbol: Symbol) -> Option<&SeatedParticipant> {
        self.participants.iter().find(|p| p.symbol == symbol)
    }

    /// The other seated participant, if any
    pub fn opponent_of(&self, participant_id: &str) -> Option<&SeatedParticipant> {
        self.participants
            .iter()
            .find(|p| p.participant_id != participant_id)
    }

    pub fn has_participant(&self, participant_id: &str) -> bool {
        self.participant(participant_id).is_some()
    }

    pub fn is_full(&self) -> bool {
        self.participants.len() >= SEATS
    }

    pub fn last_move(&self) -> Option<&MoveRecord> {
        self.move_log.last()
    }

    /// Seat the second participant of an invite session (Waiting → Active)
    pub fn join(&mut self, participant: Participant) -> Result<()> {
        if self.has_participant(&participant.participant_id) {
            return Err(MatchmakingError::AlreadyJoined {
                session_id: self.id.to_string(),
                participant_id: participant.participant_id,
            }
            .into());
        }

        if self.status.is_terminal() {
            return Err(MatchmakingError::SessionNotActive {
                session_id: self.id.to_string(),
            }
            .into());
        }

        if self.status != SessionStatus::Waiting || self.is_full() {
            return Err(MatchmakingError::SessionFull {
                session_id: self.id.to_string(),
            }
            .into());
        }

        let remaining = self
            .participants
            .first()
            .map(|creator| creator.symbol.opposite())
            .unwrap_or(Symbol::X);

        self.participants
            .push(SeatedParticipant::seat(participant, remaining));
        self.status = SessionStatus::Active;

        let now = current_timestamp();
        self.started_at = Some(now);
        self.last_activity_at = now;
        Ok(())
    }

    /// Commit an engine outcome, completing the session if it is terminal
    ///
    /// Returns the recorded outcome when this move ended the game.
    pub fn commit_move(&mut self, outcome: &MoveOutcome) -> Option<Outcome> {
        self.board = outcome.board.clone();
        self.turn = outcome.next_turn;
        self.last_activity_at = outcome.move_record.applied_at;
        self.move_log.push(outcome.move_record.clone());

        let terminal = outcome.terminal?;
        let winner_participant_id = terminal
            .winner_symbol
            .and_then(|symbol| self.participant_by_symbol(symbol))
            .map(|p| p.participant_id.clone());

        let result = Outcome {
            winner_participant_id,
            winner_symbol: terminal.winner_symbol,
            winning_line: terminal.winning_line,
            is_draw: terminal.is_draw,
        };

        self.status = SessionStatus::Completed;
        self.completed_at = Some(outcome.move_record.applied_at);
        self.outcome = Some(result.clone());
        Some(result)
    }

    /// Whether no activity has happened for longer than `timeout`
    pub fn is_idle(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        is_idle(self.last_activity_at, now, timeout)
    }

    /// Mark a non-terminal session as abandoned
    ///
    /// Returns false if the session had already concluded.
    pub fn mark_abandoned(&mut self, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }

        self.status = SessionStatus::Abandoned;
        self.completed_at = Some(now);
        true
    }

    /// Result of a completed session from one participant's point of view
    pub fn result_for(&self, participant_id: &str) -> Option<GameResult> {
        if self.status != SessionStatus::Completed || !self.has_participant(participant_id) {
            return None;
        }

        let outcome = self.outcome.as_ref()?;
        if outcome.is_draw {
            return Some(GameResult::Draw);
        }

        match &outcome.winner_participant_id {
            Some(winner) if winner == participant_id => Some(GameResult::Win),
            Some(_) => Some(GameResult::Loss),
            None => None,
        }
    }
}
