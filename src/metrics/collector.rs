//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the tictac-parlor service:
//! session lifecycle, the matchmaking queue, the move path and the
//! persistence writer.

use crate::matchmaking::queue::QueueStats;
use crate::session::registry::SessionRegistryStats;
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the game service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Session lifecycle metrics
    session_metrics: SessionMetrics,

    /// Matchmaking queue metrics
    queue_metrics: QueueMetrics,

    /// Move path metrics
    move_metrics: MoveMetrics,

    /// Performance metrics
    performance_metrics: PerformanceMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,

    /// Currently open client connections
    pub connections_active: IntGauge,

    /// Outbound events by type and delivery status
    pub events_sent_total: IntCounterVec,
}

/// Session lifecycle metrics
#[derive(Clone)]
pub struct SessionMetrics {
    /// Resident sessions by status
    pub active_sessions: IntGaugeVec,

    /// Sessions created, by origin (queue or invite)
    pub sessions_created_total: IntCounterVec,

    /// Sessions completed, by result (win or draw)
    pub sessions_completed_total: IntCounterVec,

    /// Sessions abandoned by the reaper
    pub sessions_abandoned_total: IntCounter,

    /// Sessions rehydrated from the store
    pub sessions_rehydrated_total: IntCounter,

    /// Number of moves in a finished game
    pub game_length_moves: Histogram,
}

/// Matchmaking queue metrics
#[derive(Clone)]
pub struct QueueMetrics {
    /// Enqueue requests by outcome (queued, matched, rejected)
    pub enqueue_requests_total: IntCounterVec,

    /// Participants currently waiting
    pub players_waiting: IntGauge,

    /// Queue exits by reason (leave or disconnect)
    pub dequeued_total: IntCounterVec,

    /// Time an entry spent waiting before it was paired
    pub queue_wait_time_seconds: Histogram,
}

/// Move path metrics
#[derive(Clone)]
pub struct MoveMetrics {
    /// Move submissions by result (accepted or the rejection reason)
    pub moves_total: IntCounterVec,
}

/// Performance metrics
#[derive(Clone)]
pub struct PerformanceMetrics {
    /// Enqueue processing time
    pub queue_processing_duration: Histogram,

    /// Move submission processing time
    pub move_processing_duration: Histogram,

    /// Persistence writer operation durations
    pub persistence_operation_duration: HistogramVec,

    /// Persistence retries
    pub persistence_retries_total: IntCounter,

    /// Reaper pass duration
    pub reaper_duration: Histogram,
}

impl MetricsCollector {
    /// Create a new metrics collector with its own registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let session_metrics = SessionMetrics::new(&registry)?;
        let queue_metrics = QueueMetrics::new(&registry)?;
        let move_metrics = MoveMetrics::new(&registry)?;
        let performance_metrics = PerformanceMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            session_metrics,
            queue_metrics,
            move_metrics,
            performance_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn session(&self) -> &SessionMetrics {
        &self.session_metrics
    }

    pub fn queue(&self) -> &QueueMetrics {
        &self.queue_metrics
    }

    pub fn moves(&self) -> &MoveMetrics {
        &self.move_metrics
    }

    pub fn performance(&self) -> &PerformanceMetrics {
        &self.performance_metrics
    }

    /// Refresh gauges from registry and queue snapshots
    pub fn update_from_stats(&self, sessions: &SessionRegistryStats, queue: &QueueStats) {
        self.session_metrics
            .active_sessions
            .with_label_values(&["waiting"])
            .set(sessions.waiting_sessions as i64);
        self.session_metrics
            .active_sessions
            .with_label_values(&["active"])
            .set(sessions.active_sessions as i64);

        self.queue_metrics
            .players_waiting
            .set(queue.players_waiting as i64);
    }

    /// Record an enqueue request and how it ended
    pub fn record_enqueue(&self, outcome: &str, duration: Duration) {
        self.queue_metrics
            .enqueue_requests_total
            .with_label_values(&[outcome])
            .inc();

        self.performance_metrics
            .queue_processing_duration
            .observe(duration.as_secs_f64());
    }

    /// Record a participant leaving the queue
    pub fn record_dequeue(&self, reason: &str, count: usize) {
        self.queue_metrics
            .dequeued_total
            .with_label_values(&[reason])
            .inc_by(count as u64);
    }

    /// Record how long a paired entry waited
    pub fn record_queue_wait(&self, waited: Duration) {
        self.queue_metrics
            .queue_wait_time_seconds
            .observe(waited.as_secs_f64());
    }

    /// Record a session being created
    pub fn record_session_created(&self, origin: &str) {
        self.session_metrics
            .sessions_created_total
            .with_label_values(&[origin])
            .inc();
    }

    /// Record a session reaching Completed
    pub fn record_session_completed(&self, is_draw: bool, moves: usize) {
        let result = if is_draw { "draw" } else { "win" };
        self.session_metrics
            .sessions_completed_total
            .with_label_values(&[result])
            .inc();
        self.session_metrics
            .game_length_moves
            .observe(moves as f64);
    }

    /// Record sessions abandoned by one reaper pass
    pub fn record_sessions_abandoned(&self, count: usize, duration: Duration) {
        self.session_metrics
            .sessions_abandoned_total
            .inc_by(count as u64);
        self.performance_metrics
            .reaper_duration
            .observe(duration.as_secs_f64());
    }

    /// Record a move submission
    pub fn record_move(&self, result: &str, duration: Duration) {
        self.move_metrics
            .moves_total
            .with_label_values(&[result])
            .inc();

        self.performance_metrics
            .move_processing_duration
            .observe(duration.as_secs_f64());
    }

    /// Record a persistence writer operation
    pub fn record_persistence(&self, operation: &str, success: bool, duration: Duration) {
        let status = if success { "success" } else { "error" };
        self.performance_metrics
            .persistence_operation_duration
            .with_label_values(&[operation, status])
            .observe(duration.as_secs_f64());
    }

    /// Record an outbound event delivery
    pub fn record_event_sent(&self, event_type: &str, delivered: bool) {
        let status = if delivered { "delivered" } else { "dropped" };
        self.service_metrics
            .events_sent_total
            .with_label_values(&[event_type, status])
            .inc();
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("tictac_parlor_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let health_status = IntGauge::new(
            "tictac_parlor_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("tictac_parlor_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        let connections_active = IntGauge::new(
            "tictac_parlor_connections_active",
            "Currently open client connections",
        )?;
        registry.register(Box::new(connections_active.clone()))?;

        let events_sent_total = IntCounterVec::new(
            Opts::new("tictac_parlor_events_sent_total", "Outbound events sent"),
            &["event", "status"],
        )?;
        registry.register(Box::new(events_sent_total.clone()))?;

        Ok(Self {
            uptime_seconds,
            health_status,
            component_health,
            connections_active,
            events_sent_total,
        })
    }
}

impl SessionMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let active_sessions = IntGaugeVec::new(
            Opts::new(
                "tictac_parlor_active_sessions",
                "Resident sessions by status",
            ),
            &["status"],
        )?;
        registry.register(Box::new(active_sessions.clone()))?;

        let sessions_created_total = IntCounterVec::new(
            Opts::new(
                "tictac_parlor_sessions_created_total",
                "Total sessions created",
            ),
            &["origin"],
        )?;
        registry.register(Box::new(sessions_created_total.clone()))?;

        let sessions_completed_total = IntCounterVec::new(
            Opts::new(
                "tictac_parlor_sessions_completed_total",
                "Total sessions completed",
            ),
            &["result"],
        )?;
        registry.register(Box::new(sessions_completed_total.clone()))?;

        let sessions_abandoned_total = IntCounter::new(
            "tictac_parlor_sessions_abandoned_total",
            "Total sessions abandoned for inactivity",
        )?;
        registry.register(Box::new(sessions_abandoned_total.clone()))?;

        let sessions_rehydrated_total = IntCounter::new(
            "tictac_parlor_sessions_rehydrated_total",
            "Sessions loaded back from the store",
        )?;
        registry.register(Box::new(sessions_rehydrated_total.clone()))?;

        let game_length_moves = Histogram::with_opts(
            HistogramOpts::new("tictac_parlor_game_length_moves", "Moves per finished game")
                .buckets(vec![5.0, 6.0, 7.0, 8.0, 9.0]),
        )?;
        registry.register(Box::new(game_length_moves.clone()))?;

        Ok(Self {
            active_sessions,
            sessions_created_total,
            sessions_completed_total,
            sessions_abandoned_total,
            sessions_rehydrated_total,
            game_length_moves,
        })
    }
}

impl QueueMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let enqueue_requests_total = IntCounterVec::new(
            Opts::new(
                "tictac_parlor_enqueue_requests_total",
                "Total enqueue requests",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(enqueue_requests_total.clone()))?;

        let players_waiting = IntGauge::new(
            "tictac_parlor_players_waiting",
            "Players currently waiting in queue",
        )?;
        registry.register(Box::new(players_waiting.clone()))?;

        let dequeued_total = IntCounterVec::new(
            Opts::new(
                "tictac_parlor_dequeued_total",
                "Players removed from the queue without a match",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(dequeued_total.clone()))?;

        let queue_wait_time_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "tictac_parlor_queue_wait_time_seconds",
                "Player queue wait time",
            )
            .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 300.0]),
        )?;
        registry.register(Box::new(queue_wait_time_seconds.clone()))?;

        Ok(Self {
            enqueue_requests_total,
            players_waiting,
            dequeued_total,
            queue_wait_time_seconds,
        })
    }
}

impl MoveMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let moves_total = IntCounterVec::new(
            Opts::new("tictac_parlor_moves_total", "Total move submissions"),
            &["result"],
        )?;
        registry.register(Box::new(moves_total.clone()))?;

        Ok(Self { moves_total })
    }
}

impl PerformanceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let queue_processing_duration = Histogram::with_opts(
            HistogramOpts::new(
                "tictac_parlor_queue_processing_duration_seconds",
                "Enqueue processing time",
            )
            .buckets(vec![0.0001, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        )?;
        registry.register(Box::new(queue_processing_duration.clone()))?;

        let move_processing_duration = Histogram::with_opts(
            HistogramOpts::new(
                "tictac_parlor_move_processing_duration_seconds",
                "Move processing time",
            )
            .buckets(vec![0.00001, 0.0001, 0.001, 0.005, 0.01, 0.05]),
        )?;
        registry.register(Box::new(move_processing_duration.clone()))?;

        let persistence_operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "tictac_parlor_persistence_operation_duration_seconds",
                "Persistence operation duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation", "status"],
        )?;
        registry.register(Box::new(persistence_operation_duration.clone()))?;

        let persistence_retries_total = IntCounter::new(
            "tictac_parlor_persistence_retries_total",
            "Persistence retries after a failed save",
        )?;
        registry.register(Box::new(persistence_retries_total.clone()))?;

        let reaper_duration = Histogram::with_opts(
            HistogramOpts::new(
                "tictac_parlor_reaper_duration_seconds",
                "Idle session reaper pass duration",
            )
            .buckets(vec![0.0001, 0.001, 0.01, 0.1, 1.0]),
        )?;
        registry.register(Box::new(reaper_duration.clone()))?;

        Ok(Self {
            queue_processing_duration,
            move_processing_duration,
            persistence_operation_duration,
            persistence_retries_total,
            reaper_duration,
        })
    }
}
