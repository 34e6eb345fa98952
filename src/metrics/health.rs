//! HTTP server for health checks, Prometheus metrics and the WebSocket gateway
//!
//! The same Axum router serves the monitoring endpoints and the `/ws` upgrade
//! route, so the service listens on a single port.

use crate::error::MatchmakingError;
use crate::gateway::messages::parse_session_id;
use crate::gateway::websocket;
use crate::metrics::collector::MetricsCollector;
use crate::service::app::ServiceComponents;
use crate::service::health::{HealthCheck, HealthStatus};
use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

const SERVICE_NAME: &str = "tictac-parlor";

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct HealthServerConfig {
    pub port: u16,
    /// Host to bind to (typically "0.0.0.0" for all interfaces)
    pub host: String,
}

impl Default for HealthServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}

/// Shared state for the HTTP handlers
#[derive(Clone)]
pub struct HealthServerState {
    pub metrics_collector: Arc<MetricsCollector>,
    pub components: Option<ServiceComponents>,
}

/// Server that provides the HTTP and WebSocket endpoints
pub struct HealthServer {
    config: HealthServerConfig,
    state: HealthServerState,
    shutdown_tx: broadcast::Sender<()>,
}

impl HealthServer {
    pub fn new(config: HealthServerConfig, metrics_collector: Arc<MetricsCollector>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            state: HealthServerState {
                metrics_collector,
                components: None,
            },
            shutdown_tx,
        }
    }

    /// Attach the running service, enabling the probes and the gateway route
    pub fn with_components(mut self, components: ServiceComponents) -> Self {
        self.state.components = Some(components);
        self
    }

    /// Bind the listening socket
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid HTTP server address")?;

        TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind HTTP server to {}", addr))
    }

    /// Serve requests on an already bound listener until stopped
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let app = self.create_router();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        if let Ok(addr) = listener.local_addr() {
            info!("HTTP server listening on http://{}", addr);
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("HTTP server shutdown signal received");
            })
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }

    /// Bind and serve
    pub async fn start(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Create the Axum router with all endpoints
    pub fn create_router(&self) -> Router {
        let router = Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler))
            .route("/ready", get(ready_handler))
            .route("/alive", get(alive_handler))
            .route("/metrics", get(metrics_handler))
            .route("/stats", get(stats_handler))
            .route("/sessions/{session_id}", get(session_handler))
            .with_state(self.state.clone());

        match &self.state.components {
            Some(components) => router.merge(websocket::router(components.gateway_state())),
            None => router,
        }
    }

    /// Stop the server
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping HTTP server...");

        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Failed to send shutdown signal to HTTP server: {}", e);
        }

        Ok(())
    }
}

fn not_initialized() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({
            "status": "unhealthy",
            "service": SERVICE_NAME,
            "version": env!("CARGO_PKG_VERSION"),
            "error": "Service not initialized"
        })),
    )
}

/// Root endpoint handler - shows service information
async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "/ws",
            "/health",
            "/ready",
            "/alive",
            "/metrics",
            "/stats",
            "/sessions/{id}"
        ]
    }))
}

/// Lightweight health check endpoint handler
async fn health_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    debug!("Health check requested");

    let Some(components) = &state.components else {
        return not_initialized();
    };

    let status = HealthCheck::liveness_check(components)
        .await
        .unwrap_or(HealthStatus::Unhealthy);
    let code = match status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };

    (
        code,
        Json(json!({
            "status": status,
            "service": SERVICE_NAME,
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// Readiness check endpoint handler
async fn ready_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    debug!("Readiness check requested");

    let Some(components) = &state.components else {
        return (StatusCode::SERVICE_UNAVAILABLE, "Service not initialized");
    };

    match HealthCheck::readiness_check(components).await {
        Ok(HealthStatus::Healthy) => (StatusCode::OK, "Ready"),
        Ok(HealthStatus::Degraded) => (StatusCode::OK, "Degraded but ready"),
        Ok(HealthStatus::Unhealthy) => (StatusCode::SERVICE_UNAVAILABLE, "Not ready"),
        Err(e) => {
            error!("Readiness check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "Not ready")
        }
    }
}

/// Liveness check endpoint handler
async fn alive_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    let Some(components) = &state.components else {
        return (StatusCode::SERVICE_UNAVAILABLE, "Service not initialized");
    };

    match HealthCheck::liveness_check(components).await {
        Ok(HealthStatus::Healthy) => (StatusCode::OK, "Alive"),
        _ => (StatusCode::SERVICE_UNAVAILABLE, "Not alive"),
    }
}

/// Prometheus metrics endpoint handler
async fn metrics_handler(State(state): State<HealthServerState>) -> Response {
    let metric_families = state.metrics_collector.registry().gather();
    let encoder = TextEncoder::new();

    match encoder.encode_to_string(&metric_families) {
        Ok(metrics_output) => {
            debug!("Serving {} metric families", metric_families.len());
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, encoder.format_type().to_string())],
                metrics_output,
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics".to_string(),
            )
                .into_response()
        }
    }
}

/// Detailed service statistics endpoint handler
async fn stats_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    debug!("Stats endpoint requested");

    let Some(components) = &state.components else {
        return not_initialized();
    };

    match HealthCheck::check(components).await {
        Ok(health) => {
            let stats = json!({
                "service": {
                    "name": SERVICE_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                    "status": health.status,
                    "uptimeSeconds": health.stats.uptime_seconds
                },
                "sessions": {
                    "active": health.stats.active_sessions,
                    "waiting": health.stats.waiting_sessions,
                    "pendingWrites": health.stats.concluded_pending,
                    "created": health.stats.sessions_created,
                    "completed": health.stats.sessions_completed,
                    "abandoned": health.stats.sessions_abandoned
                },
                "queue": {
                    "waiting": health.stats.players_waiting,
                    "matched": health.stats.players_matched
                },
                "moves": {
                    "applied": health.stats.moves_applied,
                    "rejected": health.stats.moves_rejected
                },
                "connections": {
                    "open": health.stats.connections,
                    "participantsOnline": health.stats.participants_online
                },
                "components": health.checks,
                "timestamp": chrono::Utc::now()
            });

            (StatusCode::OK, Json(stats))
        }
        Err(e) => {
            error!("Failed to get stats: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "service": { "name": SERVICE_NAME, "status": "error" },
                    "error": "Failed to get service stats",
                    "timestamp": chrono::Utc::now()
                })),
            )
        }
    }
}

/// Session snapshot endpoint handler
async fn session_handler(
    State(state): State<HealthServerState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let Some(components) = &state.components else {
        return not_initialized();
    };

    let lookup = match parse_session_id(&session_id) {
        Ok(id) => components.registry().get_session(id).await,
        Err(e) => Err(e),
    };

    match lookup {
        Ok(session) => match serde_json::to_value(&session) {
            Ok(value) => (StatusCode::OK, Json(value)),
            Err(e) => {
                error!("Failed to serialize session {}: {}", session_id, e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Failed to serialize session" })),
                )
            }
        },
        Err(e) => match e.downcast_ref::<MatchmakingError>() {
            Some(MatchmakingError::SessionNotFound { .. }) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "Game not found" })),
            ),
            _ => {
                error!("Session lookup for {} failed: {}", session_id, e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Failed to load session" })),
                )
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use axum::{
        body::{to_bytes, Body},
        http::Request,
    };
    use tower::ServiceExt; // for oneshot

    fn bare_router() -> Router {
        let collector = Arc::new(MetricsCollector::new().expect("Failed to create collector"));
        HealthServer::new(HealthServerConfig::default(), collector).create_router()
    }

    fn service_router(components: &ServiceComponents) -> Router {
        HealthServer::new(
            HealthServerConfig::default(),
            components.metrics_collector(),
        )
        .with_components(components.clone())
        .create_router()
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_root_endpoint() {
        let (status, body) = get(bare_router(), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "tictac-parlor");
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let collector = Arc::new(MetricsCollector::new().expect("Failed to create collector"));
        collector.record_session_created("queue");
        collector.update_health_status(2);

        let app = HealthServer::new(HealthServerConfig::default(), collector).create_router();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers().get("content-type").unwrap();
        assert!(content_type.to_str().unwrap().contains("text/plain"));

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("tictac_parlor_sessions_created_total"));
    }

    #[tokio::test]
    async fn test_endpoints_without_components() {
        for uri in ["/health", "/ready", "/alive", "/stats"] {
            let response = bare_router()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_404_handling() {
        let (status, _) = get(bare_router(), "/nonexistent").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_probes_follow_running_flag() {
        let components = ServiceComponents::build(&AppConfig::default()).unwrap();

        let (status, body) = get(service_router(&components), "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "unhealthy");

        components.set_running(true).await;
        let (status, body) = get(service_router(&components), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let response = service_router(&components)
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stats_endpoint() {
        let components = ServiceComponents::build(&AppConfig::default()).unwrap();
        components.set_running(true).await;
        components
            .queue()
            .enqueue("alice", "Alice", "conn-a")
            .unwrap();

        let (status, body) = get(service_router(&components), "/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["queue"]["waiting"], 1);
        assert_eq!(body["sessions"]["active"], 0);
    }

    #[tokio::test]
    async fn test_session_endpoint() {
        let components = ServiceComponents::build(&AppConfig::default()).unwrap();
        let session = components
            .registry()
            .create_invite_session(crate::types::Participant::new("alice", "Alice", "conn-a"))
            .unwrap();

        let (status, body) =
            get(service_router(&components), &format!("/sessions/{}", session.id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "waiting");
        assert_eq!(body["participants"][0]["participantId"], "alice");

        let (status, _) = get(
            service_router(&components),
            &format!("/sessions/{}", uuid::Uuid::new_v4()),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = get(service_router(&components), "/sessions/not-a-uuid").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
