//! Per-participant game statistics

use crate::error::{MatchmakingError, Result};
use crate::types::{GameResult, ParticipantId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// Receives one result per participant when a session completes
#[async_trait]
pub trait StatsSink: Send + Sync {
    async fn record_outcome(&self, participant_id: &str, result: GameResult) -> Result<()>;
}

/// Running totals for one participant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStats {
    pub games_played: u32,
    pub games_won: u32,
    pub games_lost: u32,
    pub games_drawn: u32,
    pub total_score: u64,
    /// Percentage of games won
    pub win_rate: f64,
}

impl PlayerStats {
    pub fn apply(&mut self, result: GameResult) {
        self.games_played += 1;
        match result {
            GameResult::Win => self.games_won += 1,
            GameResult::Loss => self.games_lost += 1,
            GameResult::Draw => self.games_drawn += 1,
        }
        self.total_score += result.points();
        self.win_rate = self.games_won as f64 / self.games_played as f64 * 100.0;
    }
}

/// Stats sink that keeps totals in memory
#[derive(Debug, Default)]
pub struct InMemoryStatsSink {
    players: RwLock<HashMap<ParticipantId, PlayerStats>>,
}

impl InMemoryStatsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, participant_id: &str) -> Option<PlayerStats> {
        self.players
            .read()
            .ok()
            .and_then(|players| players.get(participant_id).cloned())
    }

    /// Snapshot of every tracked participant
    pub fn all(&self) -> HashMap<ParticipantId, PlayerStats> {
        self.players
            .read()
            .map(|players| players.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StatsSink for InMemoryStatsSink {
    async fn record_outcome(&self, participant_id: &str, result: GameResult) -> Result<()> {
        let mut players = self
            .players
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("player stats"))?;

        let stats = players.entry(participant_id.to_string()).or_default();
        stats.apply(result);

        debug!(
            "Recorded {} for '{}' - played: {}, score: {}, win_rate: {:.1}%",
            result, participant_id, stats.games_played, stats.total_score, stats.win_rate
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scores_and_win_rate() {
        let sink = InMemoryStatsSink::new();

        sink.record_outcome("alice", GameResult::Win).await.unwrap();
        sink.record_outcome("alice", GameResult::Draw).await.unwrap();
        sink.record_outcome("alice", GameResult::Loss).await.unwrap();
        sink.record_outcome("alice", GameResult::Win).await.unwrap();

        let stats = sink.get("alice").unwrap();
        assert_eq!(stats.games_played, 4);
        assert_eq!(stats.games_won, 2);
        assert_eq!(stats.games_lost, 1);
        assert_eq!(stats.games_drawn, 1);
        assert_eq!(stats.total_score, 7);
        assert!((stats.win_rate - 50.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_unknown_participant() {
        let sink = InMemoryStatsSink::new();
        assert!(sink.get("nobody").is_none());
        assert!(sink.all().is_empty());
    }
}
