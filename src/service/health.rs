//! Health checks for the tictac-parlor service
//!
//! Readiness and liveness probes plus a detailed component report used by
//! the `/health` and `/stats` endpoints.

use crate::service::app::ServiceComponents;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// How long the persistence probe may wait for the writer to drain
const PERSISTENCE_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Health check status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Gauge value reported to Prometheus
    pub fn as_gauge(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 2,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 0,
        }
    }

    fn combine(self, other: &HealthStatus) -> Self {
        match (&self, other) {
            (HealthStatus::Unhealthy, _) | (_, HealthStatus::Unhealthy) => HealthStatus::Unhealthy,
            (HealthStatus::Degraded, _) | (_, HealthStatus::Degraded) => HealthStatus::Degraded,
            _ => HealthStatus::Healthy,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "✅ healthy"),
            HealthStatus::Degraded => write!(f, "⚠️  degraded"),
            HealthStatus::Unhealthy => write!(f, "❌ unhealthy"),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    pub service: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    pub name: String,
    pub status: HealthStatus,
    /// Optional error message if not healthy
    pub message: Option<String>,
    /// Check duration in milliseconds
    pub duration_ms: u64,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceStats {
    /// Resident Active sessions
    pub active_sessions: usize,
    /// Resident Waiting (invite) sessions
    pub waiting_sessions: usize,
    /// Concluded sessions not yet accepted by the store
    pub concluded_pending: usize,
    /// Participants waiting in the queue
    pub players_waiting: usize,
    pub sessions_created: u64,
    pub sessions_completed: u64,
    pub sessions_abandoned: u64,
    /// Participants paired by the queue since start
    pub players_matched: u64,
    pub moves_applied: u64,
    pub moves_rejected: u64,
    /// Open client connections
    pub connections: usize,
    /// Participants currently online
    pub participants_online: usize,
    pub uptime_seconds: u64,
}

impl HealthCheck {
    /// Perform a comprehensive health check of the service
    pub async fn check(components: &ServiceComponents) -> Result<Self> {
        let checks = vec![
            Self::check_service_running(components).await,
            Self::check_session_registry(components),
            Self::check_matchmaking_queue(components),
            Self::check_persistence(components).await,
        ];

        let status = checks
            .iter()
            .fold(HealthStatus::Healthy, |acc, check| acc.combine(&check.status));

        Ok(HealthCheck {
            status,
            service: components.config().service.name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats: Self::gather_service_stats(components),
        })
    }

    /// Simple liveness check - just verify service is running
    pub async fn liveness_check(components: &ServiceComponents) -> Result<HealthStatus> {
        if components.is_running().await {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    /// Readiness check - verify service can handle requests
    pub async fn readiness_check(components: &ServiceComponents) -> Result<HealthStatus> {
        if !components.is_running().await {
            return Ok(HealthStatus::Unhealthy);
        }

        let status = Self::check_session_registry(components)
            .status
            .combine(&Self::check_matchmaking_queue(components).status);
        Ok(status)
    }

    async fn check_service_running(components: &ServiceComponents) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) = if components.is_running().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        component("service_running", status, message, start)
    }

    fn check_session_registry(components: &ServiceComponents) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) = match components.registry().get_stats() {
            Ok(_) => (HealthStatus::Healthy, None),
            Err(e) => {
                error!("Session registry stats check failed: {}", e);
                (
                    HealthStatus::Unhealthy,
                    Some(format!("Stats check failed: {}", e)),
                )
            }
        };

        component("session_registry", status, message, start)
    }

    fn check_matchmaking_queue(components: &ServiceComponents) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) = match components.queue().get_stats() {
            Ok(_) => (HealthStatus::Healthy, None),
            Err(e) => {
                error!("Matchmaking queue stats check failed: {}", e);
                (
                    HealthStatus::Unhealthy,
                    Some(format!("Stats check failed: {}", e)),
                )
            }
        };

        component("matchmaking_queue", status, message, start)
    }

    /// The writer is healthy when it drains its backlog promptly
    async fn check_persistence(components: &ServiceComponents) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) =
            match tokio::time::timeout(PERSISTENCE_PROBE_TIMEOUT, components.registry().flush())
                .await
            {
                Ok(Ok(())) => (HealthStatus::Healthy, None),
                Ok(Err(e)) => (HealthStatus::Unhealthy, Some(e.to_string())),
                Err(_) => (
                    HealthStatus::Degraded,
                    Some(format!(
                        "Persistence backlog not drained within {:?}",
                        PERSISTENCE_PROBE_TIMEOUT
                    )),
                ),
            };

        component("persistence_writer", status, message, start)
    }

    /// Gather current service statistics
    pub fn gather_service_stats(components: &ServiceComponents) -> ServiceStats {
        let mut stats = ServiceStats {
            connections: components.hub().connection_count(),
            participants_online: components.gateway().online_count(),
            uptime_seconds: components.uptime().as_secs(),
            ..ServiceStats::default()
        };

        match components.registry().get_stats() {
            Ok(registry_stats) => {
                stats.active_sessions = registry_stats.active_sessions;
                stats.waiting_sessions = registry_stats.waiting_sessions;
                stats.concluded_pending = registry_stats.concluded_pending;
                stats.sessions_created = registry_stats.sessions_created;
                stats.sessions_completed = registry_stats.sessions_completed;
                stats.sessions_abandoned = registry_stats.sessions_abandoned;
                stats.moves_applied = registry_stats.moves_applied;
                stats.moves_rejected = registry_stats.moves_rejected;
            }
            Err(e) => debug!("Failed to get registry stats for health check: {}", e),
        }

        match components.queue().get_stats() {
            Ok(queue_stats) => {
                stats.players_waiting = queue_stats.players_waiting;
                stats.players_matched = queue_stats.players_matched;
            }
            Err(e) => debug!("Failed to get queue stats for health check: {}", e),
        }

        stats
    }
}

fn component(
    name: &str,
    status: HealthStatus,
    message: Option<String>,
    start: Instant,
) -> ComponentCheck {
    ComponentCheck {
        name: name.to_string(),
        status,
        message,
        duration_ms: start.elapsed().as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_status_combination() {
        assert_eq!(
            HealthStatus::Healthy.combine(&HealthStatus::Degraded),
            HealthStatus::Degraded
        );
        assert_eq!(
            HealthStatus::Degraded.combine(&HealthStatus::Unhealthy),
            HealthStatus::Unhealthy
        );
        assert_eq!(
            HealthStatus::Healthy.combine(&HealthStatus::Healthy),
            HealthStatus::Healthy
        );
        assert_eq!(HealthStatus::Degraded.as_gauge(), 1);
    }

    #[tokio::test]
    async fn test_not_running_is_unhealthy() {
        let components = ServiceComponents::build(&AppConfig::default()).unwrap();

        assert_eq!(
            HealthCheck::liveness_check(&components).await.unwrap(),
            HealthStatus::Unhealthy
        );
        assert_eq!(
            HealthCheck::readiness_check(&components).await.unwrap(),
            HealthStatus::Unhealthy
        );

        let report = HealthCheck::check(&components).await.unwrap();
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert_eq!(report.checks.len(), 4);
        assert_eq!(report.service, "tictac-parlor");
    }

    #[tokio::test]
    async fn test_running_service_reports_stats() {
        let components = ServiceComponents::build(&AppConfig::default()).unwrap();
        components.set_running(true).await;
        components
            .queue()
            .enqueue("alice", "Alice", "conn-a")
            .unwrap();

        let report = HealthCheck::check(&components).await.unwrap();
        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.stats.players_waiting, 1);
        assert_eq!(report.stats.sessions_created, 0);

        components.queue().enqueue("bob", "Bob", "conn-b").unwrap();
        let stats = HealthCheck::gather_service_stats(&components);
        assert_eq!(stats.players_waiting, 0);
        assert_eq!(stats.active_sessions, 1);
        assert_eq!(stats.players_matched, 2);
    }
}
