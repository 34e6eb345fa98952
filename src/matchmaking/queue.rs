//! First-available matchmaking queue
//!
//! Waiting participants are kept in insertion order. An enqueue that finds
//! somebody already waiting pairs with the oldest entry immediately. The scan,
//! the removal of the partner and the creation of the session all happen under
//! one lock, so an entry can never be matched twice or left behind after a
//! successful pairing.

use crate::error::{MatchmakingError, Result};
use crate::metrics::MetricsCollector;
use crate::session::{Session, SessionRegistry};
use crate::types::{ParticipantId, QueueEntry};
use crate::utils::current_timestamp;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;
use tracing::{debug, info, warn};

/// What happened to an enqueue request
#[derive(Debug, Clone)]
pub enum EnqueueOutcome {
    /// Paired with a waiting participant
    Matched(Session),
    /// Stored in the pool; `position` is the pool size after insertion
    Queued { position: usize },
}

/// Statistics about queue operations
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    /// Total accepted enqueue requests
    pub players_enqueued: u64,
    /// Total participants that left the pool through a pairing
    pub players_matched: u64,
    /// Total participants that left without a pairing
    pub players_left: u64,
    /// Total rejected duplicate enqueues
    pub duplicates_rejected: u64,
    /// Current pool size
    pub players_waiting: usize,
}

/// The matchmaking queue
#[derive(Clone)]
pub struct MatchmakingQueue {
    /// Waiting participants in insertion order
    pool: Arc<Mutex<VecDeque<QueueEntry>>>,
    /// Registry that creates paired sessions
    registry: Arc<SessionRegistry>,
    /// Queue statistics
    stats: Arc<RwLock<QueueStats>>,
    /// Metrics collector for recording performance data
    metrics_collector: Arc<MetricsCollector>,
}

impl MatchmakingQueue {
    /// Create a queue that pairs into sessions owned by `registry`
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        let metrics_collector = registry.metrics_collector();
        Self {
            pool: Arc::new(Mutex::new(VecDeque::new())),
            registry,
            stats: Arc::new(RwLock::new(QueueStats::default())),
            metrics_collector,
        }
    }

    fn update_stats(&self, update: impl FnOnce(&mut QueueStats)) -> Result<()> {
        let mut stats = self
            .stats
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("queue stats"))?;
        update(&mut stats);
        Ok(())
    }

    /// Add a participant to the pool, pairing immediately if possible
    pub fn enqueue(
        &self,
        participant_id: &str,
        display_name: &str,
        transport_handle: &str,
    ) -> Result<EnqueueOutcome> {
        let start_time = Instant::now();

        info!(
            "Processing enqueue - participant_id: '{}', display_name: '{}', handle: {}",
            participant_id, display_name, transport_handle
        );

        let result = self.enqueue_locked(QueueEntry {
            participant_id: participant_id.to_string(),
            display_name: display_name.to_string(),
            transport_handle: transport_handle.to_string(),
            enqueued_at: current_timestamp(),
        });

        let duration = start_time.elapsed();
        let outcome = match &result {
            Ok(EnqueueOutcome::Matched(_)) => "matched",
            Ok(EnqueueOutcome::Queued { .. }) => "queued",
            Err(_) => "rejected",
        };
        self.metrics_collector.record_enqueue(outcome, duration);

        info!(
            "Enqueue completed - participant_id: '{}', duration: {:.2}ms, result: {}",
            participant_id,
            duration.as_secs_f64() * 1000.0,
            outcome
        );

        result
    }

    fn enqueue_locked(&self, entry: QueueEntry) -> Result<EnqueueOutcome> {
        let mut pool = self
            .pool
            .lock()
            .map_err(|_| MatchmakingError::lock_poisoned("queue"))?;

        if pool
            .iter()
            .any(|waiting| waiting.participant_id == entry.participant_id)
        {
            drop(pool);
            self.update_stats(|stats| stats.duplicates_rejected += 1)?;
            return Err(MatchmakingError::AlreadyQueued {
                participant_id: entry.participant_id,
            }
            .into());
        }

        let partner_index = pool
            .iter()
            .position(|waiting| waiting.participant_id != entry.participant_id);

        let Some(index) = partner_index else {
            pool.push_back(entry);
            let position = pool.len();
            self.metrics_collector.queue().players_waiting.set(position as i64);
            drop(pool);

            self.update_stats(|stats| {
                stats.players_enqueued += 1;
                stats.players_waiting = position;
            })?;
            return Ok(EnqueueOutcome::Queued { position });
        };

        let Some(partner) = pool.remove(index) else {
            return Err(MatchmakingError::InternalError {
                message: format!("queue entry {} vanished under lock", index),
            }
            .into());
        };

        let session = match self
            .registry
            .create_paired_session(partner.participant(), entry.participant())
        {
            Ok(session) => session,
            Err(e) => {
                // Put the partner back where it was so nobody is lost
                warn!(
                    "Failed to create session for '{}' and '{}': {}",
                    partner.participant_id, entry.participant_id, e
                );
                pool.insert(index, partner);
                return Err(e);
            }
        };

        let waiting = pool.len();
        self.metrics_collector.queue().players_waiting.set(waiting as i64);
        drop(pool);

        if let Ok(waited) = (current_timestamp() - partner.enqueued_at).to_std() {
            self.metrics_collector.record_queue_wait(waited);
        }
        self.update_stats(|stats| {
            stats.players_enqueued += 1;
            stats.players_matched += 2;
            stats.players_waiting = waiting;
        })?;

        info!(
            "Matched '{}' with '{}' in session {}",
            partner.participant_id, entry.participant_id, session.id
        );
        Ok(EnqueueOutcome::Matched(session))
    }

    /// Remove a waiting participant
    ///
    /// Returns false if there was no entry, including when a pairing already
    /// consumed it.
    pub fn dequeue(&self, participant_id: &str) -> Result<bool> {
        let removed = self.remove_where(|entry| entry.participant_id == participant_id)?;
        let found = !removed.is_empty();

        if found {
            self.metrics_collector.record_dequeue("leave", removed.len());
            debug!("Participant '{}' left the queue", participant_id);
        } else {
            debug!(
                "Dequeue for '{}' ignored, no waiting entry",
                participant_id
            );
        }
        Ok(found)
    }

    /// Remove every entry owned by a transport handle
    pub fn dequeue_by_handle(&self, transport_handle: &str) -> Result<Vec<ParticipantId>> {
        let removed = self.remove_where(|entry| entry.transport_handle == transport_handle)?;

        if !removed.is_empty() {
            self.metrics_collector
                .record_dequeue("disconnect", removed.len());
            info!(
                "Removed {} queue entries for disconnected handle {}",
                removed.len(),
                transport_handle
            );
        }
        Ok(removed)
    }

    fn remove_where(&self, predicate: impl Fn(&QueueEntry) -> bool) -> Result<Vec<ParticipantId>> {
        let (removed, waiting) = {
            let mut pool = self
                .pool
                .lock()
                .map_err(|_| MatchmakingError::lock_poisoned("queue"))?;
            let mut removed = Vec::new();
            pool.retain(|entry| {
                if predicate(entry) {
                    removed.push(entry.participant_id.clone());
                    false
                } else {
                    true
                }
            });
            (removed, pool.len())
        };

        if !removed.is_empty() {
            self.metrics_collector.queue().players_waiting.set(waiting as i64);
            let count = removed.len() as u64;
            self.update_stats(|stats| {
                stats.players_left += count;
                stats.players_waiting = waiting;
            })?;
        }
        Ok(removed)
    }

    /// Current pool size
    pub fn len(&self) -> usize {
        self.pool.lock().map(|pool| pool.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 1-based position of a waiting participant
    pub fn position_of(&self, participant_id: &str) -> Option<usize> {
        self.pool.lock().ok().and_then(|pool| {
            pool.iter()
                .position(|entry| entry.participant_id == participant_id)
                .map(|index| index + 1)
        })
    }

    /// Get current queue statistics
    pub fn get_stats(&self) -> Result<QueueStats> {
        let mut stats = self
            .stats
            .read()
            .map_err(|_| MatchmakingError::lock_poisoned("queue stats"))?
            .clone();
        stats.players_waiting = self.len();
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{InMemorySessionStore, InMemoryStatsSink, SessionStatus};

    fn create_test_queue() -> MatchmakingQueue {
        let registry = SessionRegistry::new(
            Arc::new(InMemorySessionStore::new()),
            Arc::new(InMemoryStatsSink::new()),
        )
        .unwrap()
        .with_seed(7);
        MatchmakingQueue::new(Arc::new(registry))
    }

    fn matched(outcome: EnqueueOutcome) -> Session {
        match outcome {
            EnqueueOutcome::Matched(session) => session,
            EnqueueOutcome::Queued { position } => {
                panic!("expected a match, queued at {}", position)
            }
        }
    }

    #[tokio::test]
    async fn test_first_enqueue_waits() {
        let queue = create_test_queue();

        let outcome = queue.enqueue("alice", "Alice", "conn-a").unwrap();
        assert!(matches!(outcome, EnqueueOutcome::Queued { position: 1 }));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.position_of("alice"), Some(1));
    }

    #[tokio::test]
    async fn test_second_enqueue_pairs() {
        let queue = create_test_queue();

        queue.enqueue("alice", "Alice", "conn-a").unwrap();
        let session = matched(queue.enqueue("bob", "Bob", "conn-b").unwrap());

        assert_eq!(session.status, SessionStatus::Active);
        assert!(session.has_participant("alice"));
        assert!(session.has_participant("bob"));
        assert_ne!(
            session.participant("alice").unwrap().symbol,
            session.participant("bob").unwrap().symbol
        );
        assert!(queue.is_empty());
        assert_eq!(queue.position_of("alice"), None);

        let stats = queue.get_stats().unwrap();
        assert_eq!(stats.players_enqueued, 2);
        assert_eq!(stats.players_matched, 2);
        assert_eq!(stats.players_waiting, 0);
    }

    #[tokio::test]
    async fn test_duplicate_enqueue_rejected() {
        let queue = create_test_queue();

        queue.enqueue("alice", "Alice", "conn-a").unwrap();
        let err = queue.enqueue("alice", "Alice", "conn-a").unwrap_err();

        assert!(matches!(
            err.downcast_ref::<MatchmakingError>(),
            Some(MatchmakingError::AlreadyQueued { .. })
        ));
        assert_eq!(err.to_string(), "Already in queue: alice");
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get_stats().unwrap().duplicates_rejected, 1);
    }

    #[tokio::test]
    async fn test_pairing_is_first_come_first_served() {
        let queue = create_test_queue();

        queue.enqueue("alice", "Alice", "conn-a").unwrap();
        let first = matched(queue.enqueue("bob", "Bob", "conn-b").unwrap());
        assert!(first.has_participant("alice"));

        queue.enqueue("carol", "Carol", "conn-c").unwrap();
        let second = matched(queue.enqueue("dave", "Dave", "conn-d").unwrap());
        assert!(second.has_participant("carol"));
        assert!(second.has_participant("dave"));
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_dequeue() {
        let queue = create_test_queue();

        queue.enqueue("alice", "Alice", "conn-a").unwrap();
        assert!(queue.dequeue("alice").unwrap());
        assert!(queue.is_empty());
        assert!(!queue.dequeue("alice").unwrap());

        // Leaving frees the slot for a fresh enqueue
        let outcome = queue.enqueue("alice", "Alice", "conn-a").unwrap();
        assert!(matches!(outcome, EnqueueOutcome::Queued { position: 1 }));
    }

    #[tokio::test]
    async fn test_dequeue_after_pairing_is_noop() {
        let queue = create_test_queue();

        queue.enqueue("alice", "Alice", "conn-a").unwrap();
        let session = matched(queue.enqueue("bob", "Bob", "conn-b").unwrap());

        assert!(!queue.dequeue("alice").unwrap());
        assert!(!queue.dequeue("bob").unwrap());

        let current = queue.registry.get_session(session.id).await.unwrap();
        assert_eq!(current.status, SessionStatus::Active);
        assert_eq!(current.participants.len(), 2);
    }

    #[tokio::test]
    async fn test_dequeue_by_handle() {
        let queue = create_test_queue();

        queue.enqueue("alice", "Alice", "conn-a").unwrap();
        assert_eq!(
            queue.dequeue_by_handle("conn-a").unwrap(),
            vec!["alice".to_string()]
        );
        assert!(queue.dequeue_by_handle("conn-a").unwrap().is_empty());
        assert_eq!(queue.get_stats().unwrap().players_left, 1);
    }
}
