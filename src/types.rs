//! Common types used throughout the session service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for participants
pub type ParticipantId = String;

/// Unique identifier for game sessions
pub type SessionId = Uuid;

/// Opaque handle identifying the connection a participant talks through
pub type TransportHandle = String;

/// Marker a participant places on the board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Symbol {
    X,
    O,
}

impl Symbol {
    /// The symbol held by the other participant
    pub fn opposite(self) -> Self {
        match self {
            Symbol::X => Symbol::O,
            Symbol::O => Symbol::X,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Symbol::X => "X",
            Symbol::O => "O",
        }
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A participant as known before being seated in a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub transport_handle: TransportHandle,
}

impl Participant {
    pub fn new(
        participant_id: impl Into<ParticipantId>,
        display_name: impl Into<String>,
        transport_handle: impl Into<TransportHandle>,
    ) -> Self {
        Self {
            participant_id: participant_id.into(),
            display_name: display_name.into(),
            transport_handle: transport_handle.into(),
        }
    }
}

/// Per-participant result of a completed session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameResult {
    Win,
    Loss,
    Draw,
}

impl GameResult {
    /// Score contribution of this result
    pub fn points(&self) -> u64 {
        match self {
            GameResult::Win => 3,
            GameResult::Draw => 1,
            GameResult::Loss => 0,
        }
    }
}

impl std::fmt::Display for GameResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GameResult::Win => write!(f, "win"),
            GameResult::Loss => write!(f, "loss"),
            GameResult::Draw => write!(f, "draw"),
        }
    }
}

/// Waiting participant in the matchmaking pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub transport_handle: TransportHandle,
    pub enqueued_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn participant(&self) -> Participant {
        Participant {
            participant_id: self.participant_id.clone(),
            display_name: self.display_name.clone(),
            transport_handle: self.transport_handle.clone(),
        }
    }
}
