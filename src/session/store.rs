//! Durable session storage
//!
//! The registry only keeps live sessions resident. Every committed state is
//! handed to a `SessionStore`, which is also the source of truth for sessions
//! that have been evicted.

use crate::error::{MatchmakingError, Result};
use crate::session::instance::Session;
use crate::types::SessionId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// Storage backend for session snapshots
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert or replace the snapshot for `session.id`
    async fn save(&self, session: &Session) -> Result<()>;

    /// Find a session that has not concluded yet
    async fn find_active(&self, session_id: SessionId) -> Result<Option<Session>>;

    /// Find a session in any state
    async fn find_by_id(&self, session_id: SessionId) -> Result<Option<Session>>;
}

/// Process-local session store
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
    save_count: RwLock<u64>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions
    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total successful `save` calls
    pub fn save_count(&self) -> u64 {
        self.save_count.read().map(|c| *c).unwrap_or(0)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn save(&self, session: &Session) -> Result<()> {
        {
            let mut sessions = self
                .sessions
                .write()
                .map_err(|_| MatchmakingError::lock_poisoned("session store"))?;
            sessions.insert(session.id, session.clone());
        }

        if let Ok(mut count) = self.save_count.write() {
            *count += 1;
        }

        debug!(
            "Stored session {} - status: {}, moves: {}",
            session.id,
            session.status,
            session.move_log.len()
        );
        Ok(())
    }

    async fn find_active(&self, session_id: SessionId) -> Result<Option<Session>> {
        let found = self.find_by_id(session_id).await?;
        Ok(found.filter(|session| !session.status.is_terminal()))
    }

    async fn find_by_id(&self, session_id: SessionId) -> Result<Option<Session>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| MatchmakingError::lock_poisoned("session store"))?;
        Ok(sessions.get(&session_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::instance::SessionStatus;
    use crate::types::{Participant, Symbol};
    use crate::utils::current_timestamp;

    fn session() -> Session {
        Session::new_paired(
            Participant::new("alice", "Alice", "conn-a"),
            Symbol::X,
            Participant::new("bob", "Bob", "conn-b"),
        )
    }

    #[tokio::test]
    async fn test_save_and_find() {
        let store = InMemorySessionStore::new();
        let session = session();

        store.save(&session).await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.save_count(), 1);

        let found = store.find_by_id(session.id).await.unwrap().unwrap();
        assert_eq!(found, session);
        assert!(store.find_active(session.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_save_replaces_snapshot() {
        let store = InMemorySessionStore::new();
        let mut session = session();
        store.save(&session).await.unwrap();

        session.mark_abandoned(current_timestamp());
        store.save(&session).await.unwrap();

        assert_eq!(store.len(), 1);
        let found = store.find_by_id(session.id).await.unwrap().unwrap();
        assert_eq!(found.status, SessionStatus::Abandoned);
        // Concluded sessions are not returned as active
        assert!(store.find_active(session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let store = InMemorySessionStore::new();
        let id = crate::utils::generate_session_id();
        assert!(store.find_by_id(id).await.unwrap().is_none());
        assert!(store.find_active(id).await.unwrap().is_none());
    }
}
