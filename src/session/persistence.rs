//! Ordered background writer for session snapshots
//!
//! Gameplay never waits on storage. The registry enqueues a snapshot after
//! each commit while it still holds that session's lock, so a single writer
//! task receives the snapshots of one session in commit order and applies
//! them in that order. Failed saves are retried with exponential backoff.
//!
//! A concluded session's final snapshot is held in memory from the moment it
//! is queued until the store has accepted it, so lookups never fall through
//! to an older stored state of a finished game.

use crate::config::PersistenceSettings;
use crate::error::{MatchmakingError, Result};
use crate::metrics::MetricsCollector;
use crate::session::instance::{Session, SessionStatus};
use crate::session::stats::StatsSink;
use crate::session::store::SessionStore;
use crate::types::SessionId;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// A snapshot waiting to be written
#[derive(Debug, Clone)]
pub struct PersistenceJob {
    pub session: Session,
    /// Report per-participant results once this snapshot is handled
    pub record_outcome: bool,
}

enum WriterCommand {
    Save(PersistenceJob),
    Flush(oneshot::Sender<()>),
}

/// Final snapshots of concluded sessions not yet accepted by the store
#[derive(Debug, Clone, Default)]
pub struct ConcludedSessions {
    sessions: Arc<RwLock<HashMap<SessionId, Session>>>,
}

impl ConcludedSessions {
    pub fn new() -> Self {
        Self::default()
    }

    fn hold(&self, session: Session) -> Result<()> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("concluded sessions"))?;
        sessions.insert(session.id, session);
        Ok(())
    }

    pub fn get(&self, session_id: SessionId) -> Result<Option<Session>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| MatchmakingError::lock_poisoned("concluded sessions"))?;
        Ok(sessions.get(&session_id).cloned())
    }

    fn release(&self, session_id: SessionId) -> Result<bool> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("concluded sessions"))?;
        Ok(sessions.remove(&session_id).is_some())
    }

    /// Number of concluded sessions still waiting on the store
    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle to the persistence writer task
#[derive(Clone)]
pub struct PersistenceWriter {
    sender: mpsc::UnboundedSender<WriterCommand>,
    concluded: ConcludedSessions,
}

impl PersistenceWriter {
    /// Spawn the writer task on the current tokio runtime
    pub fn spawn(
        store: Arc<dyn SessionStore>,
        stats_sink: Arc<dyn StatsSink>,
        settings: PersistenceSettings,
        metrics_collector: Arc<MetricsCollector>,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let concluded = ConcludedSessions::new();
        let worker = Worker {
            store,
            stats_sink,
            settings,
            metrics_collector,
            concluded: concluded.clone(),
        };
        let handle = tokio::spawn(worker.run(receiver));
        (Self { sender, concluded }, handle)
    }

    /// Queue a snapshot for writing
    ///
    /// Never blocks, so it is safe to call while holding a session lock.
    /// Concluded snapshots stay readable through `concluded` until saved.
    pub fn enqueue(&self, session: Session, record_outcome: bool) -> Result<()> {
        let session_id = session.id;
        if session.status.is_terminal() {
            self.concluded.hold(session.clone())?;
        }
        let job = PersistenceJob {
            session,
            record_outcome,
        };
        if self.sender.send(WriterCommand::Save(job)).is_err() {
            error!(
                "Persistence writer stopped, dropping snapshot of session {}",
                session_id
            );
        }
        Ok(())
    }

    /// Final snapshot of a concluded session the store may not have yet
    pub fn concluded(&self, session_id: SessionId) -> Result<Option<Session>> {
        self.concluded.get(session_id)
    }

    /// Concluded sessions still waiting on the store
    pub fn pending_concluded(&self) -> usize {
        self.concluded.len()
    }

    /// Wait until every snapshot queued before this call has been handled
    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(WriterCommand::Flush(tx))
            .map_err(|_| MatchmakingError::PersistenceFailed {
                message: "Persistence writer is not running".to_string(),
            })?;
        rx.await.map_err(|_| MatchmakingError::PersistenceFailed {
            message: "Persistence writer stopped before flushing".to_string(),
        })?;
        Ok(())
    }
}

struct Worker {
    store: Arc<dyn SessionStore>,
    stats_sink: Arc<dyn StatsSink>,
    settings: PersistenceSettings,
    metrics_collector: Arc<MetricsCollector>,
    concluded: ConcludedSessions,
}

impl Worker {
    async fn run(self, mut receiver: mpsc::UnboundedReceiver<WriterCommand>) {
        info!(
            "Persistence writer started - max_retries: {}, retry_delay: {}ms",
            self.settings.max_retries, self.settings.retry_delay_ms
        );

        while let Some(command) = receiver.recv().await {
            match command {
                WriterCommand::Save(job) => self.handle(job).await,
                WriterCommand::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }

        info!("Persistence writer stopped");
    }

    async fn handle(&self, job: PersistenceJob) {
        let start_time = Instant::now();
        let saved = self.save_with_retry(&job.session).await;

        self.metrics_collector
            .record_persistence("save", saved.is_ok(), start_time.elapsed());
        match &saved {
            Ok(()) if job.session.status.is_terminal() => {
                if let Err(e) = self.concluded.release(job.session.id) {
                    error!("Failed to release concluded session {}: {}", job.session.id, e);
                }
            }
            Ok(()) => {}
            Err(e) => error!(
                "Giving up on snapshot of session {} (status: {}, moves: {}): {}",
                job.session.id,
                job.session.status,
                job.session.move_log.len(),
                e
            ),
        }

        // The in-memory result is authoritative, so stats are reported even
        // when the snapshot could not be stored.
        if job.record_outcome && job.session.status == SessionStatus::Completed {
            self.record_outcomes(&job.session).await;
        }
    }

    async fn save_with_retry(&self, session: &Session) -> Result<()> {
        let mut retry_count = 0;
        let mut delay = self.settings.retry_delay();

        loop {
            match self.store.save(session).await {
                Ok(()) => {
                    debug!(
                        "Saved session {} - status: {}, moves: {}",
                        session.id,
                        session.status,
                        session.move_log.len()
                    );
                    return Ok(());
                }
                Err(e) => {
                    retry_count += 1;
                    if retry_count > self.settings.max_retries {
                        return Err(MatchmakingError::PersistenceFailed {
                            message: format!(
                                "session {} after {} retries: {}",
                                session.id, self.settings.max_retries, e
                            ),
                        }
                        .into());
                    }

                    warn!(
                        "Save attempt {} failed for session {}: {}. Retrying in {:?}",
                        retry_count, session.id, e, delay
                    );
                    self.metrics_collector
                        .performance()
                        .persistence_retries_total
                        .inc();

                    sleep(delay).await;
                    delay = (delay * 2).min(self.settings.max_retry_delay());
                }
            }
        }
    }

    async fn record_outcomes(&self, session: &Session) {
        for participant in &session.participants {
            let Some(result) = session.result_for(&participant.participant_id) else {
                continue;
            };

            if let Err(e) = self
                .stats_sink
                .record_outcome(&participant.participant_id, result)
                .await
            {
                error!(
                    "Failed to record {} for '{}' in session {}: {}",
                    result, participant.participant_id, session.id, e
                );
            }
        }
    }
}
