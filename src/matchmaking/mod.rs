//! Matchmaking for anonymous participants
//!
//! Participants join a single FIFO pool and are paired on a first-available
//! basis. Pairs are handed to the session registry as Active sessions.

pub mod queue;

pub use queue::{EnqueueOutcome, MatchmakingQueue, QueueStats};
