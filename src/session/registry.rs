//! Session registry for handling live game sessions
//!
//! This module provides the SessionRegistry that owns the working set of
//! sessions, drives their state transitions, evicts concluded sessions and
//! falls back to the session store for sessions that are no longer resident.

use crate::config::{AppConfig, PersistenceSettings, SessionSettings};
use crate::engine::{apply_move, MoveOutcome};
use crate::error::{MatchmakingError, MoveError, Result};
use crate::metrics::MetricsCollector;
use crate::session::instance::{Outcome, Session, SessionStatus};
use crate::session::persistence::PersistenceWriter;
use crate::session::stats::StatsSink;
use crate::session::store::SessionStore;
use crate::types::{Participant, SessionId, Symbol};
use crate::utils::current_timestamp;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, Instant};
use tracing::{debug, error, info, warn};

/// Statistics about session registry operations
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionRegistryStats {
    /// Total number of sessions created
    pub sessions_created: u64,
    /// Total number of sessions completed by a win or draw
    pub sessions_completed: u64,
    /// Total number of sessions abandoned by the reaper
    pub sessions_abandoned: u64,
    /// Total number of sessions loaded back from the store
    pub sessions_rehydrated: u64,
    /// Total number of accepted moves
    pub moves_applied: u64,
    /// Total number of rejected moves
    pub moves_rejected: u64,
    /// Current number of resident Active sessions
    pub active_sessions: usize,
    /// Current number of resident Waiting sessions
    pub waiting_sessions: usize,
    /// Concluded sessions whose final snapshot is not stored yet
    pub concluded_pending: usize,
}

/// Result of an accepted move
#[derive(Debug, Clone)]
pub struct MoveCommit {
    /// Session state right after the commit
    pub session: Session,
    /// Engine output for the move
    pub outcome: MoveOutcome,
    /// Set when this move concluded the game
    pub completed: Option<Outcome>,
}

/// One resident session behind its own lock
type SessionSlot = Arc<Mutex<Session>>;

/// The session registry
#[derive(Clone)]
pub struct SessionRegistry {
    /// Resident sessions by ID
    sessions: Arc<RwLock<HashMap<SessionId, SessionSlot>>>,
    /// Durable storage, consulted for sessions that are not resident
    store: Arc<dyn SessionStore>,
    /// Ordered snapshot writer
    persistence: PersistenceWriter,
    /// Randomness source for symbol assignment
    rng: Arc<Mutex<StdRng>>,
    /// Inactivity threshold for the reaper
    idle_timeout: chrono::Duration,
    /// Registry statistics
    stats: Arc<RwLock<SessionRegistryStats>>,
    /// Metrics collector for recording performance data
    metrics_collector: Arc<MetricsCollector>,
}

impl SessionRegistry {
    /// Create a registry with default settings
    ///
    /// Spawns the persistence writer, so this must run inside a tokio runtime.
    pub fn new(store: Arc<dyn SessionStore>, stats_sink: Arc<dyn StatsSink>) -> Result<Self> {
        let metrics_collector = Arc::new(MetricsCollector::new()?);
        Ok(Self::with_settings(
            store,
            stats_sink,
            &SessionSettings::default(),
            PersistenceSettings::default(),
            metrics_collector,
        ))
    }

    /// Create a registry from the application configuration
    pub fn with_config(
        store: Arc<dyn SessionStore>,
        stats_sink: Arc<dyn StatsSink>,
        config: &AppConfig,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        Self::with_settings(
            store,
            stats_sink,
            &config.session,
            config.persistence.clone(),
            metrics_collector,
        )
    }

    /// Create a registry with explicit session and persistence settings
    pub fn with_settings(
        store: Arc<dyn SessionStore>,
        stats_sink: Arc<dyn StatsSink>,
        session_settings: &SessionSettings,
        persistence_settings: PersistenceSettings,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        let (persistence, _writer) = PersistenceWriter::spawn(
            store.clone(),
            stats_sink,
            persistence_settings,
            metrics_collector.clone(),
        );

        let rng = match session_settings.symbol_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            store,
            persistence,
            rng: Arc::new(Mutex::new(rng)),
            idle_timeout: session_settings.idle_timeout(),
            stats: Arc::new(RwLock::new(SessionRegistryStats::default())),
            metrics_collector,
        }
    }

    /// Use a fixed seed for symbol assignment
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Arc::new(Mutex::new(StdRng::seed_from_u64(seed)));
        self
    }

    /// Override the inactivity threshold
    pub fn with_idle_timeout(mut self, idle_timeout: chrono::Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn metrics_collector(&self) -> Arc<MetricsCollector> {
        self.metrics_collector.clone()
    }

    /// Unbiased coin flip
    fn flip_symbol(&self) -> Result<Symbol> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| MatchmakingError::lock_poisoned("symbol rng"))?;
        Ok(if rng.gen_bool(0.5) {
            Symbol::X
        } else {
            Symbol::O
        })
    }

    fn update_stats(&self, update: impl FnOnce(&mut SessionRegistryStats)) -> Result<()> {
        let mut stats = self
            .stats
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("registry stats"))?;
        update(&mut stats);
        Ok(())
    }

    /// Insert a new session into the working set and persist it
    fn admit(&self, session: Session, origin: &str) -> Result<Session> {
        let session_id = session.id;
        let snapshot = session.clone();

        // Queued before the session becomes reachable, so it is written first
        self.persistence.enqueue(snapshot.clone(), false)?;
        {
            let mut sessions = self
                .sessions
                .write()
                .map_err(|_| MatchmakingError::lock_poisoned("sessions"))?;
            sessions.insert(session_id, Arc::new(Mutex::new(session)));
        }

        self.update_stats(|stats| stats.sessions_created += 1)?;
        self.metrics_collector.record_session_created(origin);

        Ok(snapshot)
    }

    /// Create an Active session for two participants from the queue
    ///
    /// Symbols are assigned by a coin flip; X always moves first.
    pub fn create_paired_session(&self, first: Participant, second: Participant) -> Result<Session> {
        if first.participant_id == second.participant_id {
            return Err(MatchmakingError::InvalidRequest {
                reason: format!(
                    "cannot pair participant '{}' with itself",
                    first.participant_id
                ),
            }
            .into());
        }

        let first_symbol = self.flip_symbol()?;
        let session = Session::new_paired(first, first_symbol, second);

        info!(
            "Created paired session {} - X: '{}', O: '{}'",
            session.id,
            session
                .participant_by_symbol(Symbol::X)
                .map(|p| p.participant_id.as_str())
                .unwrap_or_default(),
            session
                .participant_by_symbol(Symbol::O)
                .map(|p| p.participant_id.as_str())
                .unwrap_or_default()
        );

        self.admit(session, "queue")
    }

    /// Create a Waiting session with only the creator seated
    pub fn create_invite_session(&self, creator: Participant) -> Result<Session> {
        let symbol = self.flip_symbol()?;
        let session = Session::new_invite(creator, symbol);

        info!(
            "Created invite session {} - creator: '{}' as {}",
            session.id,
            session
                .participants
                .first()
                .map(|p| p.participant_id.as_str())
                .unwrap_or_default(),
            symbol
        );

        self.admit(session, "invite")
    }

    /// Seat the second participant of an invite session
    pub async fn join_invite_session(
        &self,
        session_id: SessionId,
        participant: Participant,
    ) -> Result<Session> {
        let slot = self.resident_or_rehydrate(session_id).await?;
        let participant_id = participant.participant_id.clone();

        let snapshot = {
            let mut session = slot
                .lock()
                .map_err(|_| MatchmakingError::lock_poisoned("session"))?;
            session.join(participant)?;
            let snapshot = session.clone();
            self.persistence.enqueue(snapshot.clone(), false)?;
            snapshot
        };

        info!(
            "Participant '{}' joined invite session {} - status: {}",
            participant_id, session_id, snapshot.status
        );
        Ok(snapshot)
    }

    /// Validate, apply and commit a move
    pub async fn submit_move(
        &self,
        session_id: SessionId,
        actor_id: &str,
        row: i64,
        col: i64,
    ) -> Result<MoveCommit> {
        let timer = self.metrics_collector.start_timer();
        let result = self.submit_move_inner(session_id, actor_id, row, col).await;
        let duration = timer.stop();

        let label = match &result {
            Ok(_) => "accepted",
            Err(e) => match e.downcast_ref::<MatchmakingError>() {
                Some(MatchmakingError::InvalidMove(move_error)) => move_error_label(*move_error),
                Some(MatchmakingError::SessionNotFound { .. }) => "session_not_found",
                _ => "error",
            },
        };
        self.metrics_collector.record_move(label, duration);

        let accepted = result.is_ok();
        self.update_stats(|stats| {
            if accepted {
                stats.moves_applied += 1;
            } else {
                stats.moves_rejected += 1;
            }
        })?;

        match &result {
            Ok(_) => debug!(
                "Move accepted - session: {}, actor: '{}', at: ({}, {}), duration: {:.3}ms",
                session_id,
                actor_id,
                row,
                col,
                duration.as_secs_f64() * 1000.0
            ),
            Err(e) => debug!(
                "Move rejected - session: {}, actor: '{}', at: ({}, {}): {}",
                session_id, actor_id, row, col, e
            ),
        }

        result
    }

    async fn submit_move_inner(
        &self,
        session_id: SessionId,
        actor_id: &str,
        row: i64,
        col: i64,
    ) -> Result<MoveCommit> {
        let slot = self.resident_or_rehydrate_for(session_id, actor_id).await?;

        let commit = {
            let mut session = slot
                .lock()
                .map_err(|_| MatchmakingError::lock_poisoned("session"))?;

            let outcome =
                apply_move(&session, actor_id, row, col).map_err(MatchmakingError::from)?;
            let completed = session.commit_move(&outcome);

            // Enqueued under the session lock so snapshots reach the writer in commit order
            let snapshot = session.clone();
            self.persistence
                .enqueue(snapshot.clone(), completed.is_some())?;

            MoveCommit {
                session: snapshot,
                outcome,
                completed,
            }
        };

        if let Some(outcome) = &commit.completed {
            info!(
                "Session {} completed - winner: {}, draw: {}, moves: {}",
                session_id,
                outcome
                    .winner_participant_id
                    .as_deref()
                    .unwrap_or("none"),
                outcome.is_draw,
                commit.session.move_log.len()
            );
            self.update_stats(|stats| stats.sessions_completed += 1)?;
            self.metrics_collector
                .record_session_completed(outcome.is_draw, commit.session.move_log.len());
            self.remove_if_terminal(session_id)?;
        }

        Ok(commit)
    }

    /// Get a session snapshot, from the working set or the store
    pub async fn get_session(&self, session_id: SessionId) -> Result<Session> {
        if let Some(slot) = self.resident(session_id)? {
            let session = slot
                .lock()
                .map_err(|_| MatchmakingError::lock_poisoned("session"))?;
            return Ok(session.clone());
        }

        if let Some(concluded) = self.persistence.concluded(session_id)? {
            return Ok(concluded);
        }

        debug!("Session {} not resident, fetching from store", session_id);
        self.store
            .find_by_id(session_id)
            .await?
            .ok_or_else(|| not_found(session_id))
    }

    /// Whether the session is currently in the working set
    pub fn is_resident(&self, session_id: SessionId) -> bool {
        matches!(self.resident(session_id), Ok(Some(_)))
    }

    /// Evict a session from the working set if it has concluded
    ///
    /// Returns true when the session was removed.
    pub fn remove_if_terminal(&self, session_id: SessionId) -> Result<bool> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("sessions"))?;

        let terminal = match sessions.get(&session_id) {
            Some(slot) => slot
                .lock()
                .map_err(|_| MatchmakingError::lock_poisoned("session"))?
                .status
                .is_terminal(),
            None => false,
        };

        if terminal {
            sessions.remove(&session_id);
            debug!("Evicted concluded session {}", session_id);
        }
        Ok(terminal)
    }

    /// Abandon and evict every session idle for longer than the timeout
    ///
    /// Returns the abandoned sessions as they were committed.
    pub async fn reap_idle_sessions(&self) -> Result<Vec<Session>> {
        let start_time = Instant::now();
        let now = current_timestamp();

        let candidates: Vec<(SessionId, SessionSlot)> = {
            let sessions = self
                .sessions
                .read()
                .map_err(|_| MatchmakingError::lock_poisoned("sessions"))?;
            sessions
                .iter()
                .map(|(id, slot)| (*id, Arc::clone(slot)))
                .collect()
        };

        let mut abandoned = Vec::new();
        for (session_id, slot) in candidates {
            let snapshot = {
                let mut session = slot
                    .lock()
                    .map_err(|_| MatchmakingError::lock_poisoned("session"))?;

                // Re-checked under the session lock; a move may have landed since the scan
                if !session.is_idle(now, self.idle_timeout) || !session.mark_abandoned(now) {
                    continue;
                }

                let snapshot = session.clone();
                self.persistence.enqueue(snapshot.clone(), false)?;
                snapshot
            };

            info!(
                "Abandoned idle session {} - previous activity: {}, moves: {}",
                session_id,
                snapshot.last_activity_at,
                snapshot.move_log.len()
            );
            self.remove_if_terminal(session_id)?;
            abandoned.push(snapshot);
        }

        let duration = start_time.elapsed();
        if !abandoned.is_empty() {
            let count = abandoned.len();
            self.update_stats(|stats| stats.sessions_abandoned += count as u64)?;
            info!(
                "Reaper abandoned {} sessions in {:.2}ms",
                count,
                duration.as_secs_f64() * 1000.0
            );
        }
        self.metrics_collector
            .record_sessions_abandoned(abandoned.len(), duration);

        Ok(abandoned)
    }

    /// Start the reaper task that runs periodically
    ///
    /// Every abandoned session is also sent on `abandoned_tx` so the gateway
    /// can notify its participants.
    pub fn start_reaper_task(
        self: Arc<Self>,
        period: Duration,
        abandoned_tx: Option<mpsc::UnboundedSender<Session>>,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(&self);

        let handle = tokio::spawn(async move {
            let mut reaper_interval = interval(period);

            loop {
                reaper_interval.tick().await;

                match registry.reap_idle_sessions().await {
                    Ok(abandoned) => {
                        if let Some(tx) = &abandoned_tx {
                            for session in abandoned {
                                if tx.send(session).is_err() {
                                    debug!("No listener for abandoned sessions");
                                    break;
                                }
                            }
                        }
                    }
                    Err(e) => error!("Error during idle session reaping: {}", e),
                }
            }
        });

        info!(
            "Started idle session reaper - interval: {:?}, idle_timeout: {}s",
            period,
            self.idle_timeout.num_seconds()
        );
        handle
    }

    /// Get current registry statistics
    pub fn get_stats(&self) -> Result<SessionRegistryStats> {
        let mut snapshot = self
            .stats
            .read()
            .map_err(|_| MatchmakingError::lock_poisoned("registry stats"))?
            .clone();

        let sessions = self
            .sessions
            .read()
            .map_err(|_| MatchmakingError::lock_poisoned("sessions"))?;
        snapshot.active_sessions = 0;
        snapshot.waiting_sessions = 0;
        snapshot.concluded_pending = self.persistence.pending_concluded();
        for slot in sessions.values() {
            let session = slot
                .lock()
                .map_err(|_| MatchmakingError::lock_poisoned("session"))?;
            match session.status {
                SessionStatus::Active => snapshot.active_sessions += 1,
                SessionStatus::Waiting => snapshot.waiting_sessions += 1,
                _ => {}
            }
        }

        Ok(snapshot)
    }

    /// Wait for every queued snapshot to be written
    pub async fn flush(&self) -> Result<()> {
        self.persistence.flush().await
    }

    /// Flush pending writes and release the working set
    ///
    /// Resident sessions stay recoverable from the store.
    pub async fn drain(&self) -> Result<usize> {
        info!("Draining session registry...");
        self.flush().await?;

        let released = {
            let mut sessions = self
                .sessions
                .write()
                .map_err(|_| MatchmakingError::lock_poisoned("sessions"))?;
            let count = sessions.len();
            sessions.clear();
            count
        };

        info!("Session registry drained - released {} sessions", released);
        Ok(released)
    }

    fn resident(&self, session_id: SessionId) -> Result<Option<SessionSlot>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| MatchmakingError::lock_poisoned("sessions"))?;
        Ok(sessions.get(&session_id).cloned())
    }

    /// Find a session outside the working set, rehydrating it if still live
    ///
    /// Lookup order: working set, concluded sessions whose final snapshot is
    /// still on its way to the store, live stored sessions, then any stored
    /// session.
    async fn locate(&self, session_id: SessionId) -> Result<Located> {
        if let Some(slot) = self.resident(session_id)? {
            return Ok(Located::Live(slot));
        }
        if let Some(concluded) = self.persistence.concluded(session_id)? {
            return Ok(Located::Concluded(concluded));
        }

        if let Some(stored) = self.store.find_active(session_id).await? {
            if !stored.status.is_terminal() {
                return self.rehydrate(stored);
            }
        }

        match self.store.find_by_id(session_id).await? {
            Some(stored) if stored.status.is_terminal() => Ok(Located::Concluded(stored)),
            Some(stored) => self.rehydrate(stored),
            None => Err(not_found(session_id)),
        }
    }

    async fn resident_or_rehydrate(&self, session_id: SessionId) -> Result<SessionSlot> {
        match self.locate(session_id).await? {
            Located::Live(slot) => Ok(slot),
            Located::Concluded(_) => Err(MatchmakingError::SessionNotActive {
                session_id: session_id.to_string(),
            }
            .into()),
        }
    }

    /// Like `resident_or_rehydrate`, but concluded sessions report the move
    /// error the engine would give this actor
    async fn resident_or_rehydrate_for(
        &self,
        session_id: SessionId,
        actor_id: &str,
    ) -> Result<SessionSlot> {
        match self.locate(session_id).await? {
            Located::Live(slot) => Ok(slot),
            Located::Concluded(session) => {
                let error = if session.has_participant(actor_id) {
                    MoveError::SessionNotActive
                } else {
                    MoveError::NotParticipant
                };
                Err(MatchmakingError::from(error).into())
            }
        }
    }

    /// Put a stored live session back into the working set; the first insert wins
    fn rehydrate(&self, stored: Session) -> Result<Located> {
        let session_id = stored.id;
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("sessions"))?;

        // The session may have concluded while the store was being read
        if !sessions.contains_key(&session_id) {
            if let Some(concluded) = self.persistence.concluded(session_id)? {
                return Ok(Located::Concluded(concluded));
            }
        }

        let mut inserted = false;
        let slot = sessions
            .entry(session_id)
            .or_insert_with(|| {
                inserted = true;
                Arc::new(Mutex::new(stored))
            })
            .clone();
        drop(sessions);

        if inserted {
            warn!("Rehydrated session {} from the store", session_id);
            self.update_stats(|stats| stats.sessions_rehydrated += 1)?;
            self.metrics_collector
                .session()
                .sessions_rehydrated_total
                .inc();
        }
        Ok(Located::Live(slot))
    }
}

/// Where a looked-up session currently lives
enum Located {
    Live(SessionSlot),
    Concluded(Session),
}

fn not_found(session_id: SessionId) -> anyhow::Error {
    MatchmakingError::SessionNotFound {
        session_id: session_id.to_string(),
    }
    .into()
}

fn move_error_label(error: MoveError) -> &'static str {
    match error {
        MoveError::NotParticipant => "not_participant",
        MoveError::SessionNotActive => "session_not_active",
        MoveError::OutOfBounds => "out_of_bounds",
        MoveError::NotYourTurn => "not_your_turn",
        MoveError::CellOccupied => "cell_occupied",
    }
}
