//! Command dispatch for connected clients
//!
//! `EventGateway` is the single entry point for every inbound command. It
//! translates commands into queue and registry calls, then pushes the
//! resulting events to the affected participants. Failures are reported to
//! the sender only.

use crate::error::{ErrorCategory, MatchmakingError, MoveError, Result};
use crate::gateway::broadcaster::Broadcaster;
use crate::gateway::messages::{parse_session_id, ClientCommand, ServerEvent};
use crate::matchmaking::{EnqueueOutcome, MatchmakingQueue};
use crate::metrics::MetricsCollector;
use crate::session::{SeatedParticipant, Session, SessionRegistry};
use crate::types::{Participant, ParticipantId, TransportHandle};
use crate::utils::current_timestamp;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Where a participant was last seen
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub transport_handle: TransportHandle,
    pub online: bool,
    pub last_seen: DateTime<Utc>,
}

/// Gateway between client connections and the matchmaking core
pub struct EventGateway {
    queue: Arc<MatchmakingQueue>,
    registry: Arc<SessionRegistry>,
    broadcaster: Arc<dyn Broadcaster>,
    presence: RwLock<HashMap<ParticipantId, Presence>>,
    metrics_collector: Arc<MetricsCollector>,
}

impl EventGateway {
    pub fn new(
        queue: Arc<MatchmakingQueue>,
        registry: Arc<SessionRegistry>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        let metrics_collector = registry.metrics_collector();
        Self {
            queue,
            registry,
            broadcaster,
            presence: RwLock::new(HashMap::new()),
            metrics_collector,
        }
    }

    pub fn queue(&self) -> &Arc<MatchmakingQueue> {
        &self.queue
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Decode and handle one inbound text frame
    pub async fn handle_text(&self, handle: &str, text: &str) -> Result<()> {
        match ClientCommand::decode(text) {
            Ok(command) => self.handle_command(handle, command).await,
            Err(e) => {
                debug!("Rejected frame from {}: {}", handle, e);
                self.send(handle, ServerEvent::error("Invalid message")).await;
                Err(e)
            }
        }
    }

    /// Handle one command issued on the connection `handle`
    ///
    /// On failure an `error` event is sent to the sender and the error is
    /// returned for logging.
    pub async fn handle_command(&self, handle: &str, command: ClientCommand) -> Result<()> {
        let command_type = command.command_type();
        debug!(
            "Handling {} from '{}' on {}",
            command_type,
            command.participant_id(),
            handle
        );

        let result = match &command {
            ClientCommand::JoinQueue {
                participant_id,
                display_name,
            } => self.join_queue(handle, participant_id, display_name).await,
            ClientCommand::LeaveQueue { participant_id } => {
                self.leave_queue(handle, participant_id).await
            }
            ClientCommand::MakeMove {
                session_id,
                participant_id,
                row,
                col,
            } => {
                self.make_move(handle, session_id, participant_id, *row, *col)
                    .await
            }
            ClientCommand::CreateInvite {
                participant_id,
                display_name,
            } => self.create_invite(handle, participant_id, display_name).await,
            ClientCommand::JoinInvite {
                session_id,
                participant_id,
                display_name,
            } => {
                self.join_invite(handle, session_id, participant_id, display_name)
                    .await
            }
        };

        if let Err(e) = &result {
            let message = client_message(&command, e);
            match crate::error::categorize(e) {
                ErrorCategory::Internal => warn!(
                    "{} from '{}' failed: {}",
                    command_type,
                    command.participant_id(),
                    e
                ),
                _ => debug!(
                    "{} from '{}' rejected: {}",
                    command_type,
                    command.participant_id(),
                    e
                ),
            }
            self.send(handle, ServerEvent::error(message)).await;
        }

        result
    }

    async fn join_queue(&self, handle: &str, participant_id: &str, display_name: &str) -> Result<()> {
        let outcome = self.queue.enqueue(participant_id, display_name, handle)?;
        self.claim_presence(participant_id, handle)?;

        match outcome {
            EnqueueOutcome::Queued { position } => {
                self.send(handle, ServerEvent::queue_joined(position)).await;
            }
            EnqueueOutcome::Matched(session) => {
                self.announce_game(&session).await;
            }
        }
        Ok(())
    }

    async fn leave_queue(&self, handle: &str, participant_id: &str) -> Result<()> {
        let removed = self.queue.dequeue(participant_id)?;
        if !removed {
            debug!("'{}' left the queue but was not waiting", participant_id);
        }
        self.send(handle, ServerEvent::queue_left()).await;
        Ok(())
    }

    async fn make_move(
        &self,
        handle: &str,
        session_id: &str,
        participant_id: &str,
        row: i64,
        col: i64,
    ) -> Result<()> {
        let session_id = parse_session_id(session_id)?;
        let commit = self
            .registry
            .submit_move(session_id, participant_id, row, col)
            .await?;
        // Accepted moves come from a seated participant only
        self.claim_presence(participant_id, handle)?;

        if let Some(outcome) = &commit.completed {
            info!(
                "Session {} completed - winner: {}, draw: {}",
                session_id,
                outcome
                    .winner_participant_id
                    .as_deref()
                    .unwrap_or("none"),
                outcome.is_draw
            );
        }

        if let Some(event) = ServerEvent::move_made(&commit.session) {
            self.broadcast(&commit.session, event).await;
        }
        Ok(())
    }

    async fn create_invite(&self, handle: &str, participant_id: &str, display_name: &str) -> Result<()> {
        let session = self
            .registry
            .create_invite_session(Participant::new(participant_id, display_name, handle))?;
        self.claim_presence(participant_id, handle)?;
        let your_symbol = session
            .participant(participant_id)
            .map(|p| p.symbol)
            .ok_or_else(|| MatchmakingError::InternalError {
                message: format!("creator '{}' missing from session {}", participant_id, session.id),
            })?;

        self.send(
            handle,
            ServerEvent::InviteCreated {
                session_id: session.id,
                your_symbol,
            },
        )
        .await;
        Ok(())
    }

    async fn join_invite(
        &self,
        handle: &str,
        session_id: &str,
        participant_id: &str,
        display_name: &str,
    ) -> Result<()> {
        let session_id = parse_session_id(session_id)?;
        let session = self
            .registry
            .join_invite_session(
                session_id,
                Participant::new(participant_id, display_name, handle),
            )
            .await?;
        self.claim_presence(participant_id, handle)?;
        self.announce_game(&session).await;
        Ok(())
    }

    /// Handle a closed connection
    ///
    /// Queue entries owned by the connection are removed and its participants
    /// are marked offline. Seats in running sessions are kept so the player
    /// can reconnect.
    pub async fn handle_disconnect(&self, handle: &str) -> Result<Vec<ParticipantId>> {
        let removed = self.queue.dequeue_by_handle(handle)?;

        let went_offline = {
            let mut presence = self
                .presence
                .write()
                .map_err(|_| MatchmakingError::lock_poisoned("presence"))?;
            let now = current_timestamp();
            let mut went_offline = 0;
            for entry in presence.values_mut() {
                if entry.transport_handle == handle && entry.online {
                    entry.online = false;
                    entry.last_seen = now;
                    went_offline += 1;
                }
            }
            went_offline
        };

        info!(
            "Connection {} closed - queue entries removed: {}, participants offline: {}",
            handle,
            removed.len(),
            went_offline
        );
        Ok(removed)
    }

    /// Tell both participants that a session was abandoned
    pub async fn notify_abandoned(&self, session: &Session) {
        self.broadcast(
            session,
            ServerEvent::GameAbandoned {
                session_id: session.id,
            },
        )
        .await;
    }

    /// Forward sessions reaped by the registry to their participants
    pub fn start_abandoned_listener(
        self: Arc<Self>,
        mut receiver: mpsc::UnboundedReceiver<Session>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Abandoned session listener started");
            while let Some(session) = receiver.recv().await {
                self.notify_abandoned(&session).await;
            }
            info!("Abandoned session listener stopped");
        })
    }

    pub fn presence_of(&self, participant_id: &str) -> Option<Presence> {
        self.presence
            .read()
            .ok()
            .and_then(|presence| presence.get(participant_id).cloned())
    }

    pub fn is_online(&self, participant_id: &str) -> bool {
        self.presence_of(participant_id)
            .map(|p| p.online)
            .unwrap_or(false)
    }

    pub fn online_count(&self) -> usize {
        self.presence
            .read()
            .map(|presence| presence.values().filter(|p| p.online).count())
            .unwrap_or(0)
    }

    /// Bind a participant to `handle` after one of its commands succeeded
    ///
    /// A participant online on another connection keeps that binding; only
    /// a participant whose previous connection closed is moved to a new one.
    /// Returns true when `handle` is the participant's route afterwards.
    fn claim_presence(&self, participant_id: &str, handle: &str) -> Result<bool> {
        let mut presence = self
            .presence
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("presence"))?;
        let now = current_timestamp();

        match presence.get_mut(participant_id) {
            Some(entry) if entry.online && entry.transport_handle != handle => {
                warn!(
                    "'{}' is online on {}, not rebinding to {}",
                    participant_id, entry.transport_handle, handle
                );
                Ok(false)
            }
            Some(entry) => {
                if entry.transport_handle != handle {
                    info!(
                        "'{}' reconnected - {} -> {}",
                        participant_id, entry.transport_handle, handle
                    );
                }
                entry.transport_handle = handle.to_string();
                entry.online = true;
                entry.last_seen = now;
                Ok(true)
            }
            None => {
                presence.insert(
                    participant_id.to_string(),
                    Presence {
                        transport_handle: handle.to_string(),
                        online: true,
                        last_seen: now,
                    },
                );
                Ok(true)
            }
        }
    }

    /// Current connection of a seated participant
    ///
    /// A participant who reconnected is reached on their newest connection.
    fn route_for(&self, participant: &SeatedParticipant) -> TransportHandle {
        self.presence_of(&participant.participant_id)
            .filter(|p| p.online)
            .map(|p| p.transport_handle)
            .unwrap_or_else(|| participant.transport_handle.clone())
    }

    async fn announce_game(&self, session: &Session) {
        for participant in &session.participants {
            if let Some(event) = ServerEvent::game_found_for(session, &participant.participant_id) {
                let handle = self.route_for(participant);
                self.send(&handle, event).await;
            }
        }
    }

    async fn broadcast(&self, session: &Session, event: ServerEvent) {
        for participant in &session.participants {
            let handle = self.route_for(participant);
            self.send(&handle, event.clone()).await;
        }
    }

    async fn send(&self, handle: &str, event: ServerEvent) {
        let event_type = event.event_type();
        let delivered = match self.broadcaster.deliver(handle, event).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to deliver {} to {}: {}", event_type, handle, e);
                false
            }
        };
        self.metrics_collector
            .record_event_sent(event_type, delivered);
    }
}

/// Text shown to the sender of a failed command
fn client_message(command: &ClientCommand, error: &anyhow::Error) -> String {
    if let Some(move_error) = error.downcast_ref::<MoveError>() {
        return move_error.to_string();
    }

    match error.downcast_ref::<MatchmakingError>() {
        Some(MatchmakingError::InvalidMove(move_error)) => move_error.to_string(),
        Some(MatchmakingError::SessionNotFound { .. }) => "Game not found".to_string(),
        Some(MatchmakingError::SessionNotActive { .. }) => "Game is not active".to_string(),
        Some(MatchmakingError::SessionFull { .. }) => "Game is already full".to_string(),
        Some(MatchmakingError::AlreadyJoined { .. }) => "Already joined this game".to_string(),
        Some(MatchmakingError::AlreadyQueued { .. }) => "Already in queue".to_string(),
        Some(MatchmakingError::InvalidRequest { reason }) => reason.clone(),
        _ => command.fallback_error().to_string(),
    }
}
