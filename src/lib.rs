//! Tictac Parlor - matchmaking and live sessions for two-player tic-tac-toe
//!
//! This crate provides a first-come matchmaking queue, an authoritative
//! session registry with a pure move engine, and a WebSocket event gateway
//! that streams game events to both participants.

pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod matchmaking;
pub mod metrics;
pub mod service;
pub mod session;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{MatchmakingError, MoveError, Result};
pub use types::*;

// Re-export key components
pub use engine::{apply_move, Board, Coordinate, MoveOutcome};
pub use gateway::{Broadcaster, ClientCommand, ConnectionHub, EventGateway, ServerEvent};
pub use matchmaking::{EnqueueOutcome, MatchmakingQueue};
pub use session::{
    InMemorySessionStore, InMemoryStatsSink, Session, SessionRegistry, SessionStatus,
    SessionStore, StatsSink,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
