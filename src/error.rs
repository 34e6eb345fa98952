//! Error types for the tic-tac-toe session service
//!
//! This module defines all error types. Fallible operations return the
//! crate-wide anyhow-based `Result`; callers that need to react to a specific
//! failure downcast to `MatchmakingError` (or `MoveError`).

use serde::{Deserialize, Serialize};

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Rule violations detected by the move engine
///
/// These are caused by stale or malicious clients. They are always reported to
/// the acting participant only and never retried on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MoveError {
    #[error("Player not in game")]
    NotParticipant,

    #[error("Game is not active")]
    SessionNotActive,

    #[error("Invalid position")]
    OutOfBounds,

    #[error("Not your turn")]
    NotYourTurn,

    #[error("Cell already occupied")]
    CellOccupied,
}

/// Coarse classification used when surfacing errors to clients and metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    State,
    Queue,
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::State => "state",
            ErrorCategory::Queue => "queue",
            ErrorCategory::Internal => "internal",
        }
    }
}

/// Custom error types for specific matchmaking and session scenarios
#[derive(Debug, thiserror::Error)]
pub enum MatchmakingError {
    #[error(transparent)]
    InvalidMove(#[from] MoveError),

    #[error("Game not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Game is not active: {session_id}")]
    SessionNotActive { session_id: String },

    #[error("Game is already full: {session_id}")]
    SessionFull { session_id: String },

    #[error("Player {participant_id} already joined game {session_id}")]
    AlreadyJoined {
        session_id: String,
        participant_id: String,
    },

    #[error("Already in queue: {participant_id}")]
    AlreadyQueued { participant_id: String },

    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Persistence failed: {message}")]
    PersistenceFailed { message: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

impl MatchmakingError {
    /// Classify this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            MatchmakingError::InvalidMove(MoveError::SessionNotActive) => ErrorCategory::State,
            MatchmakingError::InvalidMove(_) => ErrorCategory::Validation,
            MatchmakingError::SessionNotFound { .. }
            | MatchmakingError::SessionNotActive { .. }
            | MatchmakingError::SessionFull { .. }
            | MatchmakingError::AlreadyJoined { .. } => ErrorCategory::State,
            MatchmakingError::AlreadyQueued { .. } | MatchmakingError::InvalidRequest { .. } => {
                ErrorCategory::Queue
            }
            MatchmakingError::PersistenceFailed { .. }
            | MatchmakingError::ConfigurationError { .. }
            | MatchmakingError::InternalError { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the move rule violation, if this error is one
    pub fn as_move_error(&self) -> Option<MoveError> {
        match self {
            MatchmakingError::InvalidMove(e) => Some(*e),
            _ => None,
        }
    }

    pub(crate) fn lock_poisoned(what: &str) -> Self {
        MatchmakingError::InternalError {
            message: format!("Failed to acquire {} lock", what),
        }
    }
}

/// Categorize an arbitrary error coming out of the core
pub fn categorize(error: &anyhow::Error) -> ErrorCategory {
    if let Some(e) = error.downcast_ref::<MatchmakingError>() {
        return e.category();
    }
    if let Some(e) = error.downcast_ref::<MoveError>() {
        return MatchmakingError::InvalidMove(*e).category();
    }
    ErrorCategory::Internal
}
