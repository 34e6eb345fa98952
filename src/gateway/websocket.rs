//! WebSocket transport for the event gateway

use crate::gateway::broadcaster::ConnectionHub;
use crate::gateway::handler::EventGateway;
use crate::gateway::messages::ServerEvent;
use crate::metrics::MetricsCollector;
use crate::utils::generate_connection_id;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Shared state of the WebSocket route
#[derive(Clone)]
pub struct GatewayState {
    pub gateway: Arc<EventGateway>,
    pub hub: ConnectionHub,
    pub metrics_collector: Arc<MetricsCollector>,
}

/// Router serving `GET /ws`
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<GatewayState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: GatewayState) {
    let handle = generate_connection_id();
    let events = match state.hub.register(&handle) {
        Ok(events) => events,
        Err(e) => {
            error!("Failed to register connection {}: {}", handle, e);
            return;
        }
    };

    state.metrics_collector.service().connections_active.inc();
    info!(
        "Connection {} opened - total connections: {}",
        handle,
        state.hub.connection_count()
    );

    run_connection(socket, &handle, events, &state).await;

    if let Err(e) = state.hub.unregister(&handle) {
        warn!("Failed to unregister connection {}: {}", handle, e);
    }
    if let Err(e) = state.gateway.handle_disconnect(&handle).await {
        warn!("Disconnect cleanup failed for {}: {}", handle, e);
    }
    state.metrics_collector.service().connections_active.dec();
}

async fn run_connection(
    mut socket: WebSocket,
    handle: &str,
    mut events: mpsc::Receiver<ServerEvent>,
    state: &GatewayState,
) {
    loop {
        tokio::select! {
            inbound = socket.recv() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if let Err(e) = state.gateway.handle_text(handle, text.as_str()).await {
                        debug!("Command on {} failed: {}", handle, e);
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Connection {} errored: {}", handle, e);
                    break;
                }
            },
            outbound = events.recv() => {
                let Some(event) = outbound else { break };
                let text = match event.encode() {
                    Ok(text) => text,
                    Err(e) => {
                        error!("Dropping event for {}: {}", handle, e);
                        continue;
                    }
                };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        }
    }
}
