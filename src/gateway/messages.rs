//! Client command and server event definitions
//!
//! Every frame on the wire is a JSON object whose `type` field names the
//! command or event. Field names are camelCase.

use crate::engine::{Board, Coordinate, MoveRecord};
use crate::error::{MatchmakingError, Result};
use crate::session::{SeatedParticipant, Session};
use crate::types::{ParticipantId, SessionId, Symbol};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const QUEUE_JOINED_MESSAGE: &str = "Searching for opponent...";
pub const QUEUE_LEFT_MESSAGE: &str = "Left matchmaking queue";

/// Commands sent by a connected client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientCommand {
    JoinQueue {
        participant_id: ParticipantId,
        display_name: String,
    },
    LeaveQueue {
        participant_id: ParticipantId,
    },
    MakeMove {
        session_id: String,
        participant_id: ParticipantId,
        row: i64,
        col: i64,
    },
    CreateInvite {
        participant_id: ParticipantId,
        display_name: String,
    },
    JoinInvite {
        session_id: String,
        participant_id: ParticipantId,
        display_name: String,
    },
}

impl ClientCommand {
    /// Decode one inbound text frame
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| {
            MatchmakingError::InvalidRequest {
                reason: format!("Failed to deserialize command: {}", e),
            }
            .into()
        })
    }

    /// Name used in logs and metrics
    pub fn command_type(&self) -> &'static str {
        match self {
            ClientCommand::JoinQueue { .. } => "joinQueue",
            ClientCommand::LeaveQueue { .. } => "leaveQueue",
            ClientCommand::MakeMove { .. } => "makeMove",
            ClientCommand::CreateInvite { .. } => "createInvite",
            ClientCommand::JoinInvite { .. } => "joinInvite",
        }
    }

    /// Participant the command is issued for
    pub fn participant_id(&self) -> &str {
        match self {
            ClientCommand::JoinQueue { participant_id, .. }
            | ClientCommand::LeaveQueue { participant_id }
            | ClientCommand::MakeMove { participant_id, .. }
            | ClientCommand::CreateInvite { participant_id, .. }
            | ClientCommand::JoinInvite { participant_id, .. } => participant_id,
        }
    }

    /// Message sent to the client when the command fails for a reason it
    /// should not see in detail
    pub fn fallback_error(&self) -> &'static str {
        match self {
            ClientCommand::JoinQueue { .. } => "Failed to join queue",
            ClientCommand::LeaveQueue { .. } => "Failed to leave queue",
            ClientCommand::MakeMove { .. } => "Failed to make move",
            ClientCommand::CreateInvite { .. } => "Failed to create game",
            ClientCommand::JoinInvite { .. } => "Failed to join game",
        }
    }
}

/// Parse a client supplied session id
///
/// Ids that are not UUIDs cannot name any session.
pub fn parse_session_id(raw: &str) -> Result<SessionId> {
    Uuid::parse_str(raw).map_err(|_| {
        MatchmakingError::SessionNotFound {
            session_id: raw.to_string(),
        }
        .into()
    })
}

/// Public view of a seated participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub symbol: Symbol,
}

impl From<&SeatedParticipant> for PlayerView {
    fn from(participant: &SeatedParticipant) -> Self {
        Self {
            participant_id: participant.participant_id.clone(),
            display_name: participant.display_name.clone(),
            symbol: participant.symbol,
        }
    }
}

/// Events pushed to connected clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    QueueJoined {
        position: usize,
        message: String,
    },
    GameFound {
        session_id: SessionId,
        opponent: PlayerView,
        your_symbol: Symbol,
        board: Board,
        current_turn: Symbol,
    },
    QueueLeft {
        message: String,
    },
    MoveMade {
        session_id: SessionId,
        board: Board,
        current_turn: Symbol,
        last_move: MoveRecord,
        game_over: bool,
        winner: Option<PlayerView>,
        is_draw: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        winning_line: Option<[Coordinate; 3]>,
    },
    InviteCreated {
        session_id: SessionId,
        your_symbol: Symbol,
    },
    GameAbandoned {
        session_id: SessionId,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    pub fn queue_joined(position: usize) -> Self {
        ServerEvent::QueueJoined {
            position,
            message: QUEUE_JOINED_MESSAGE.to_string(),
        }
    }

    pub fn queue_left() -> Self {
        ServerEvent::QueueLeft {
            message: QUEUE_LEFT_MESSAGE.to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    /// Build the `gameFound` event addressed to one seat of a session
    ///
    /// Returns `None` if the participant is not seated or has no opponent yet.
    pub fn game_found_for(session: &Session, participant_id: &str) -> Option<Self> {
        let me = session.participant(participant_id)?;
        let opponent = session.opponent_of(participant_id)?;
        Some(ServerEvent::GameFound {
            session_id: session.id,
            opponent: opponent.into(),
            your_symbol: me.symbol,
            board: session.board.clone(),
            current_turn: session.turn,
        })
    }

    /// Build the `moveMade` event for the latest committed move
    pub fn move_made(session: &Session) -> Option<Self> {
        let last_move = session.last_move()?.clone();
        let outcome = session.outcome.as_ref();
        let winner = outcome
            .and_then(|o| o.winner_participant_id.as_deref())
            .and_then(|id| session.participant(id))
            .map(PlayerView::from);

        Some(ServerEvent::MoveMade {
            session_id: session.id,
            board: session.board.clone(),
            current_turn: session.turn,
            last_move,
            game_over: session.status.is_terminal(),
            winner,
            is_draw: outcome.map(|o| o.is_draw).unwrap_or(false),
            winning_line: outcome.and_then(|o| o.winning_line),
        })
    }

    /// Wire name of the event
    pub fn event_type(&self) -> &'static str {
        match self {
            ServerEvent::QueueJoined { .. } => "queueJoined",
            ServerEvent::GameFound { .. } => "gameFound",
            ServerEvent::QueueLeft { .. } => "queueLeft",
            ServerEvent::MoveMade { .. } => "moveMade",
            ServerEvent::InviteCreated { .. } => "inviteCreated",
            ServerEvent::GameAbandoned { .. } => "gameAbandoned",
            ServerEvent::Error { .. } => "error",
        }
    }

    /// Encode as one outbound text frame
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            MatchmakingError::InternalError {
                message: format!("Failed to serialize {} event: {}", self.event_type(), e),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::apply_move;
    use crate::types::Participant;
    use serde_json::json;

    fn paired() -> Session {
        Session::new_paired(
            Participant::new("alice", "Alice", "conn-a"),
            Symbol::X,
            Participant::new("bob", "Bob", "conn-b"),
        )
    }

    #[test]
    fn test_decode_make_move() {
        let command = ClientCommand::decode(
            r#"{"type":"makeMove","sessionId":"abc","participantId":"alice","row":1,"col":2}"#,
        )
        .unwrap();

        assert_eq!(
            command,
            ClientCommand::MakeMove {
                session_id: "abc".to_string(),
                participant_id: "alice".to_string(),
                row: 1,
                col: 2,
            }
        );
        assert_eq!(command.command_type(), "makeMove");
        assert_eq!(command.participant_id(), "alice");
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        let err = ClientCommand::decode(r#"{"type":"castSpell","participantId":"alice"}"#)
            .unwrap_err();
        let err = err.downcast_ref::<MatchmakingError>().unwrap();
        assert!(matches!(err, MatchmakingError::InvalidRequest { .. }));
    }

    #[test]
    fn test_parse_session_id() {
        let id = Uuid::new_v4();
        assert_eq!(parse_session_id(&id.to_string()).unwrap(), id);

        let err = parse_session_id("not-a-uuid").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MatchmakingError>(),
            Some(MatchmakingError::SessionNotFound { .. })
        ));
    }

    #[test]
    fn test_queue_joined_wire_format() {
        let value: serde_json::Value =
            serde_json::from_str(&ServerEvent::queue_joined(1).encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "queueJoined", "position": 1, "message": "Searching for opponent..."})
        );
    }

    #[test]
    fn test_game_found_addresses_each_seat() {
        let session = paired();

        let for_alice = ServerEvent::game_found_for(&session, "alice").unwrap();
        let value = serde_json::to_value(&for_alice).unwrap();
        assert_eq!(value["type"], "gameFound");
        assert_eq!(value["yourSymbol"], "X");
        assert_eq!(value["currentTurn"], "X");
        assert_eq!(value["opponent"]["participantId"], "bob");
        assert_eq!(value["opponent"]["symbol"], "O");

        let for_bob = ServerEvent::game_found_for(&session, "bob").unwrap();
        let value = serde_json::to_value(&for_bob).unwrap();
        assert_eq!(value["yourSymbol"], "O");
        assert_eq!(value["opponent"]["displayName"], "Alice");

        assert!(ServerEvent::game_found_for(&session, "carol").is_none());
    }

    #[test]
    fn test_move_made_reports_winner() {
        let mut session = paired();
        for (actor, row, col) in [
            ("alice", 0, 0),
            ("bob", 1, 1),
            ("alice", 0, 1),
            ("bob", 1, 0),
            ("alice", 0, 2),
        ] {
            let outcome = apply_move(&session, actor, row, col).unwrap();
            session.commit_move(&outcome);
        }

        let value = serde_json::to_value(ServerEvent::move_made(&session).unwrap()).unwrap();
        assert_eq!(value["gameOver"], true);
        assert_eq!(value["isDraw"], false);
        assert_eq!(value["winner"]["participantId"], "alice");
        assert_eq!(value["lastMove"]["row"], 0);
        assert_eq!(value["lastMove"]["col"], 2);
        assert_eq!(value["winningLine"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_move_made_mid_game() {
        let mut session = paired();
        assert!(ServerEvent::move_made(&session).is_none());

        let outcome = apply_move(&session, "alice", 1, 1).unwrap();
        session.commit_move(&outcome);

        let value = serde_json::to_value(ServerEvent::move_made(&session).unwrap()).unwrap();
        assert_eq!(value["gameOver"], false);
        assert_eq!(value["currentTurn"], "O");
        assert!(value["winner"].is_null());
        assert!(value.get("winningLine").is_none());
    }
}
