//! Metrics and monitoring for the tictac-parlor service
//!
//! This module provides Prometheus metrics collection and the HTTP server
//! exposing health probes, metrics and the WebSocket gateway.

pub mod collector;
pub mod health;

pub use collector::{
    MetricsCollector, MetricsTimer, MoveMetrics, PerformanceMetrics, QueueMetrics,
    ServiceMetrics, SessionMetrics,
};
pub use health::{HealthServer, HealthServerConfig};

use std::sync::Arc;

/// Unified metrics service that combines all monitoring capabilities
#[derive(Clone)]
pub struct MetricsService {
    collector: Arc<MetricsCollector>,
    health_server: Arc<HealthServer>,
}

impl MetricsService {
    pub fn new(collector: Arc<MetricsCollector>, health_server: Arc<HealthServer>) -> Self {
        Self {
            collector,
            health_server,
        }
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    pub fn health_server(&self) -> Arc<HealthServer> {
        self.health_server.clone()
    }

    /// Stop the HTTP server
    pub async fn stop(&self) -> anyhow::Result<()> {
        self.health_server.stop().await
    }
}
