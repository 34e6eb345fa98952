//! Test fixtures and collaborator doubles for integration testing

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tictac_parlor::config::{PersistenceSettings, SessionSettings};
use tictac_parlor::error::Result;
use tictac_parlor::gateway::{ClientCommand, EventGateway, MockBroadcaster, ServerEvent};
use tictac_parlor::matchmaking::MatchmakingQueue;
use tictac_parlor::metrics::MetricsCollector;
use tictac_parlor::session::{
    InMemorySessionStore, InMemoryStatsSink, Session, SessionRegistry, SessionStore,
};
use tictac_parlor::types::{SessionId, Symbol};

/// Store that fails a fixed number of saves before delegating
#[derive(Debug, Default)]
pub struct FlakySessionStore {
    inner: InMemorySessionStore,
    failures_left: AtomicU32,
    failed_saves: AtomicU32,
}

impl FlakySessionStore {
    pub fn failing(times: u32) -> Self {
        Self {
            inner: InMemorySessionStore::new(),
            failures_left: AtomicU32::new(times),
            failed_saves: AtomicU32::new(0),
        }
    }

    pub fn failed_saves(&self) -> u32 {
        self.failed_saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionStore for FlakySessionStore {
    async fn save(&self, session: &Session) -> Result<()> {
        let should_fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if should_fail {
            self.failed_saves.fetch_add(1, Ordering::SeqCst);
            return Err(anyhow::anyhow!("store temporarily unavailable"));
        }
        self.inner.save(session).await
    }

    async fn find_active(&self, session_id: SessionId) -> Result<Option<Session>> {
        self.inner.find_active(session_id).await
    }

    async fn find_by_id(&self, session_id: SessionId) -> Result<Option<Session>> {
        self.inner.find_by_id(session_id).await
    }
}

/// Store whose saves wait until they are allowed through
#[derive(Debug)]
pub struct GatedSessionStore {
    inner: InMemorySessionStore,
    gate: tokio::sync::Semaphore,
}

impl GatedSessionStore {
    pub fn closed() -> Self {
        Self {
            inner: InMemorySessionStore::new(),
            gate: tokio::sync::Semaphore::new(0),
        }
    }

    /// Let the next `saves` writes reach the store
    pub fn allow(&self, saves: usize) {
        self.gate.add_permits(saves);
    }

    pub fn save_count(&self) -> u64 {
        self.inner.save_count()
    }
}

#[async_trait]
impl SessionStore for GatedSessionStore {
    async fn save(&self, session: &Session) -> Result<()> {
        self.gate.acquire().await?.forget();
        self.inner.save(session).await
    }

    async fn find_active(&self, session_id: SessionId) -> Result<Option<Session>> {
        self.inner.find_active(session_id).await
    }

    async fn find_by_id(&self, session_id: SessionId) -> Result<Option<Session>> {
        self.inner.find_by_id(session_id).await
    }
}

/// Complete in-process system wired around a recording broadcaster
pub struct TestSystem {
    pub gateway: Arc<EventGateway>,
    pub registry: Arc<SessionRegistry>,
    pub queue: Arc<MatchmakingQueue>,
    pub broadcaster: Arc<MockBroadcaster>,
    pub store: Arc<dyn SessionStore>,
    pub stats: Arc<InMemoryStatsSink>,
}

/// Settings that keep retry loops short in tests
pub fn fast_persistence() -> PersistenceSettings {
    PersistenceSettings {
        max_retries: 3,
        retry_delay_ms: 1,
        max_retry_delay_ms: 4,
    }
}

pub fn create_test_system() -> TestSystem {
    create_test_system_with(Arc::new(InMemorySessionStore::new()), SessionSettings::default())
}

pub fn create_test_system_with(
    store: Arc<dyn SessionStore>,
    session_settings: SessionSettings,
) -> TestSystem {
    let stats = Arc::new(InMemoryStatsSink::new());
    let metrics = Arc::new(MetricsCollector::new().expect("Failed to create collector"));
    let registry = Arc::new(SessionRegistry::with_settings(
        store.clone(),
        stats.clone(),
        &SessionSettings {
            symbol_seed: Some(session_settings.symbol_seed.unwrap_or(42)),
            ..session_settings
        },
        fast_persistence(),
        metrics,
    ));
    let queue = Arc::new(MatchmakingQueue::new(registry.clone()));
    let broadcaster = Arc::new(MockBroadcaster::new());
    let gateway = Arc::new(EventGateway::new(
        queue.clone(),
        registry.clone(),
        broadcaster.clone(),
    ));

    TestSystem {
        gateway,
        registry,
        queue,
        broadcaster,
        store,
        stats,
    }
}

pub fn join_queue(participant_id: &str) -> ClientCommand {
    ClientCommand::JoinQueue {
        participant_id: participant_id.to_string(),
        display_name: format!("Player {}", participant_id),
    }
}

pub fn make_move(session_id: SessionId, participant_id: &str, row: i64, col: i64) -> ClientCommand {
    ClientCommand::MakeMove {
        session_id: session_id.to_string(),
        participant_id: participant_id.to_string(),
        row,
        col,
    }
}

/// Connection handle used for a participant in these tests
pub fn handle_of(participant_id: &str) -> String {
    format!("conn-{}", participant_id)
}

/// A paired game as seen through the gateway
pub struct PairedGame {
    pub session_id: SessionId,
    /// Participant playing X
    pub x: String,
    /// Participant playing O
    pub o: String,
}

impl PairedGame {
    pub fn player(&self, symbol: Symbol) -> &str {
        match symbol {
            Symbol::X => &self.x,
            Symbol::O => &self.o,
        }
    }
}

/// Queue two participants and return the game they were paired into
pub async fn pair(system: &TestSystem, first: &str, second: &str) -> PairedGame {
    system
        .gateway
        .handle_command(&handle_of(first), join_queue(first))
        .await
        .expect("first join failed");
    system
        .gateway
        .handle_command(&handle_of(second), join_queue(second))
        .await
        .expect("second join failed");

    let events = system.broadcaster.events_for(&handle_of(first));
    match events.last() {
        Some(ServerEvent::GameFound {
            session_id,
            your_symbol,
            ..
        }) => {
            let (x, o) = match your_symbol {
                Symbol::X => (first, second),
                Symbol::O => (second, first),
            };
            PairedGame {
                session_id: *session_id,
                x: x.to_string(),
                o: o.to_string(),
            }
        }
        other => panic!("expected gameFound for {}, got {:?}", first, other),
    }
}

/// Play a sequence of moves, alternating X and O starting with X
pub async fn play(system: &TestSystem, game: &PairedGame, moves: &[(i64, i64)]) {
    for (i, (row, col)) in moves.iter().enumerate() {
        let symbol = if i % 2 == 0 { Symbol::X } else { Symbol::O };
        let actor = game.player(symbol);
        system
            .gateway
            .handle_command(&handle_of(actor), make_move(game.session_id, actor, *row, *col))
            .await
            .unwrap_or_else(|e| panic!("move {} at ({}, {}) rejected: {}", i, row, col, e));
    }
}

pub const X_WINS_TOP_ROW: [(i64, i64); 5] = [(0, 0), (1, 1), (0, 1), (1, 0), (0, 2)];

pub const DRAW: [(i64, i64); 9] = [
    (0, 0),
    (0, 1),
    (0, 2),
    (1, 1),
    (1, 0),
    (1, 2),
    (2, 1),
    (2, 0),
    (2, 2),
];
