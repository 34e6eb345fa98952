//! Main application state and service coordination
//!
//! `ServiceComponents` is the cloneable bundle of core objects shared with the
//! HTTP handlers. `AppState` owns it together with the HTTP server and the
//! background tasks, and drives startup and graceful shutdown.

use crate::config::AppConfig;
use crate::gateway::{ConnectionHub, EventGateway, GatewayState};
use crate::matchmaking::MatchmakingQueue;
use crate::metrics::{HealthServer, HealthServerConfig, MetricsCollector, MetricsService};
use crate::service::health::HealthCheck;
use crate::session::{
    InMemorySessionStore, InMemoryStatsSink, SessionRegistry, SessionStore, StatsSink,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// How often registry and queue statistics are copied into Prometheus gauges
const METRICS_UPDATE_INTERVAL: Duration = Duration::from_secs(15);

/// How often uptime and component health are refreshed
const HEALTH_METRICS_INTERVAL: Duration = Duration::from_secs(60);

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("HTTP server error: {message}")]
    HttpServer { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Core objects shared between the gateway, the HTTP handlers and the
/// background tasks
#[derive(Clone)]
pub struct ServiceComponents {
    config: Arc<AppConfig>,
    registry: Arc<SessionRegistry>,
    queue: Arc<MatchmakingQueue>,
    gateway: Arc<EventGateway>,
    hub: ConnectionHub,
    metrics_collector: Arc<MetricsCollector>,
    is_running: Arc<RwLock<bool>>,
    started_at: Instant,
}

impl ServiceComponents {
    /// Build the components with in-memory storage
    ///
    /// Must run inside a tokio runtime.
    pub fn build(config: &AppConfig) -> Result<Self, ServiceError> {
        Self::build_with(
            config,
            Arc::new(InMemorySessionStore::new()),
            Arc::new(InMemoryStatsSink::new()),
        )
    }

    /// Build the components around the given collaborators
    pub fn build_with(
        config: &AppConfig,
        store: Arc<dyn SessionStore>,
        stats_sink: Arc<dyn StatsSink>,
    ) -> Result<Self, ServiceError> {
        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let registry = Arc::new(SessionRegistry::with_config(
            store,
            stats_sink,
            config,
            metrics_collector.clone(),
        ));
        let queue = Arc::new(MatchmakingQueue::new(registry.clone()));
        let hub = ConnectionHub::new(config.service.connection_buffer_size);
        let gateway = Arc::new(EventGateway::new(
            queue.clone(),
            registry.clone(),
            Arc::new(hub.clone()),
        ));

        Ok(Self {
            config: Arc::new(config.clone()),
            registry,
            queue,
            gateway,
            hub,
            metrics_collector,
            is_running: Arc::new(RwLock::new(false)),
            started_at: Instant::now(),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        self.registry.clone()
    }

    pub fn queue(&self) -> Arc<MatchmakingQueue> {
        self.queue.clone()
    }

    pub fn gateway(&self) -> Arc<EventGateway> {
        self.gateway.clone()
    }

    pub fn hub(&self) -> &ConnectionHub {
        &self.hub
    }

    pub fn metrics_collector(&self) -> Arc<MetricsCollector> {
        self.metrics_collector.clone()
    }

    /// State for the WebSocket route
    pub fn gateway_state(&self) -> GatewayState {
        GatewayState {
            gateway: self.gateway.clone(),
            hub: self.hub.clone(),
            metrics_collector: self.metrics_collector.clone(),
        }
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub async fn set_running(&self, running: bool) {
        *self.is_running.write().await = running;
    }

    pub fn uptime(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }
}

/// Main application state containing all service components
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    /// Core service components
    components: ServiceComponents,

    /// Metrics collector and HTTP server
    metrics_service: Arc<MetricsService>,

    /// Address the HTTP server is bound to, once started
    http_addr: Option<SocketAddr>,

    /// Background task handles
    background_tasks: Vec<JoinHandle<()>>,
}

impl AppState {
    /// Initialize the application with all dependencies
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing tictac-parlor service");
        info!(
            "Configuration: service={}, http_port={}, idle_timeout={}s, reaper_interval={}s",
            config.service.name,
            config.service.http_port,
            config.session.idle_timeout_seconds,
            config.session.reaper_interval_seconds
        );

        let components = ServiceComponents::build(&config)?;
        let metrics_service = Self::initialize_metrics(&config, &components);

        Ok(Self {
            config,
            components,
            metrics_service,
            http_addr: None,
            background_tasks: Vec::new(),
        })
    }

    /// Start the HTTP server and background tasks
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting tictac-parlor service");

        self.components.set_running(true).await;

        self.start_http_server().await?;
        self.start_session_tasks();
        self.start_background_tasks();

        info!("✅ tictac-parlor service started successfully");
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of tictac-parlor service");

        self.components.set_running(false).await;

        info!("Stopping HTTP server...");
        if let Err(e) = self.metrics_service.stop().await {
            warn!("Failed to stop HTTP server: {}", e);
        }

        self.stop_background_tasks().await;

        let timeout = self.config.shutdown_timeout();
        match tokio::time::timeout(timeout, self.components.registry.drain()).await {
            Ok(Ok(released)) => info!("✅ Session registry drained ({} sessions)", released),
            Ok(Err(e)) => warn!("Failed to drain session registry: {}", e),
            Err(_) => warn!(
                "Session registry drain did not finish within {:?}",
                timeout
            ),
        }

        let final_stats = HealthCheck::gather_service_stats(&self.components);
        info!("Final service statistics: {:?}", final_stats);
        info!("✅ tictac-parlor service shutdown completed");

        Ok(())
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn components(&self) -> &ServiceComponents {
        &self.components
    }

    pub fn metrics_service(&self) -> Arc<MetricsService> {
        self.metrics_service.clone()
    }

    /// Address the HTTP server is listening on
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http_addr
    }

    pub async fn is_running(&self) -> bool {
        self.components.is_running().await
    }

    fn initialize_metrics(config: &AppConfig, components: &ServiceComponents) -> Arc<MetricsService> {
        info!(
            "Initializing HTTP endpoints on port {}",
            config.service.http_port
        );

        let health_config = HealthServerConfig {
            port: config.service.http_port,
            host: "0.0.0.0".to_string(),
        };
        let collector = components.metrics_collector();
        let health_server = Arc::new(
            HealthServer::new(health_config, collector.clone()).with_components(components.clone()),
        );

        Arc::new(MetricsService::new(collector, health_server))
    }

    /// Bind the HTTP port and serve it from a background task
    ///
    /// Binding happens before spawning so a taken port fails startup.
    async fn start_http_server(&mut self) -> Result<(), ServiceError> {
        let health_server = self.metrics_service.health_server();
        let listener = health_server
            .bind()
            .await
            .map_err(|e| ServiceError::HttpServer {
                message: e.to_string(),
            })?;
        self.http_addr = listener.local_addr().ok();

        let server_handle = tokio::spawn(async move {
            if let Err(e) = health_server.serve(listener).await {
                error!("HTTP server failed: {}", e);
            } else {
                info!("HTTP server task completed");
            }
        });
        self.background_tasks.push(server_handle);

        if let Some(addr) = self.http_addr {
            info!("✅ HTTP server started on {} (WebSocket at /ws)", addr);
        }
        Ok(())
    }

    /// Start the idle reaper and the listener that notifies participants of
    /// abandoned sessions
    fn start_session_tasks(&mut self) {
        let (abandoned_tx, abandoned_rx) = mpsc::unbounded_channel();

        let reaper = self
            .components
            .registry()
            .start_reaper_task(self.config.reaper_interval(), Some(abandoned_tx));
        let listener = self
            .components
            .gateway()
            .start_abandoned_listener(abandoned_rx);

        self.background_tasks.push(reaper);
        self.background_tasks.push(listener);
    }

    /// Start background maintenance tasks
    fn start_background_tasks(&mut self) {
        info!(
            "Starting metrics update task ({}s interval)...",
            METRICS_UPDATE_INTERVAL.as_secs()
        );
        let metrics_task = {
            let components = self.components.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(METRICS_UPDATE_INTERVAL);

                while components.is_running().await {
                    interval.tick().await;

                    let registry_stats = components.registry.get_stats();
                    let queue_stats = components.queue.get_stats();
                    match (registry_stats, queue_stats) {
                        (Ok(sessions), Ok(queue)) => {
                            debug!(
                                "Updating metrics - active sessions: {}, waiting sessions: {}, queued players: {}",
                                sessions.active_sessions,
                                sessions.waiting_sessions,
                                queue.players_waiting
                            );
                            components
                                .metrics_collector
                                .update_from_stats(&sessions, &queue);
                        }
                        (Err(e), _) | (_, Err(e)) => {
                            warn!("Failed to get stats for metrics update: {}", e);
                        }
                    }
                }

                info!("Metrics update task stopped");
            })
        };

        info!(
            "Starting health metrics task ({}s interval)...",
            HEALTH_METRICS_INTERVAL.as_secs()
        );
        let health_metrics_task = {
            let components = self.components.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(HEALTH_METRICS_INTERVAL);

                while components.is_running().await {
                    interval.tick().await;

                    let collector = &components.metrics_collector;
                    collector
                        .service()
                        .uptime_seconds
                        .set(components.uptime().as_secs() as i64);

                    match HealthCheck::check(&components).await {
                        Ok(report) => {
                            collector.update_health_status(report.status.as_gauge());
                            for check in &report.checks {
                                collector.update_component_health(
                                    &check.name,
                                    check.status.as_gauge() > 0,
                                );
                            }
                        }
                        Err(e) => warn!("Health check for metrics failed: {}", e),
                    }
                }

                info!("Health metrics task stopped");
            })
        };

        self.background_tasks.push(metrics_task);
        self.background_tasks.push(health_metrics_task);
        info!(
            "{} background tasks running",
            self.background_tasks.len()
        );
    }

    /// Stop all background tasks
    async fn stop_background_tasks(&mut self) {
        let task_count = self.background_tasks.len();
        if task_count == 0 {
            info!("No background tasks to stop");
            return;
        }

        info!("Stopping {} background tasks...", task_count);
        for (i, task) in self.background_tasks.drain(..).enumerate() {
            debug!("Aborting background task {}/{}", i + 1, task_count);
            task.abort();
        }

        info!("✅ All {} background tasks stopped", task_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.service.http_port = 0;
        config
    }

    #[tokio::test]
    async fn test_components_share_one_registry() {
        let components = ServiceComponents::build(&AppConfig::default()).unwrap();
        components
            .queue()
            .enqueue("alice", "Alice", "conn-a")
            .unwrap();
        components.queue().enqueue("bob", "Bob", "conn-b").unwrap();

        assert_eq!(components.registry().get_stats().unwrap().active_sessions, 1);
        assert!(!components.is_running().await);
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let mut app = AppState::new(test_config()).await.unwrap();
        assert!(!app.is_running().await);

        app.start().await.unwrap();
        assert!(app.is_running().await);
        assert!(app.http_addr().is_some());

        app.shutdown().await.unwrap();
        assert!(!app.is_running().await);
    }
}
