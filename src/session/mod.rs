//! Session lifecycle management
//!
//! This module contains the session data model, the registry that owns live
//! sessions, and the storage and statistics collaborators it reports to.

pub mod instance;
pub mod persistence;
pub mod registry;
pub mod stats;
pub mod store;

// Re-export commonly used types
pub use instance::{Outcome, SeatedParticipant, Session, SessionStatus};
pub use persistence::PersistenceWriter;
pub use registry::{MoveCommit, SessionRegistry, SessionRegistryStats};
pub use stats::{InMemoryStatsSink, PlayerStats, StatsSink};
pub use store::{InMemorySessionStore, SessionStore};
