//! Delivery of server events to connected clients

use crate::error::{MatchmakingError, Result};
use crate::gateway::messages::ServerEvent;
use crate::types::TransportHandle;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Trait for pushing events to a single connection
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Deliver one event to the connection identified by `handle`
    async fn deliver(&self, handle: &str, event: ServerEvent) -> Result<()>;
}

/// Registry of live connections, each drained by its own socket task
#[derive(Clone)]
pub struct ConnectionHub {
    connections: Arc<RwLock<HashMap<TransportHandle, mpsc::Sender<ServerEvent>>>>,
    buffer_size: usize,
}

impl ConnectionHub {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            buffer_size: buffer_size.max(1),
        }
    }

    /// Register a connection and return the receiver its socket task drains
    ///
    /// Registering an existing handle replaces the old channel.
    pub fn register(&self, handle: &str) -> Result<mpsc::Receiver<ServerEvent>> {
        let (sender, receiver) = mpsc::channel(self.buffer_size);
        let mut connections = self
            .connections
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("connections"))?;
        if connections.insert(handle.to_string(), sender).is_some() {
            warn!("Connection {} re-registered, replacing old channel", handle);
        }
        debug!(
            "Registered connection {} - total connections: {}",
            handle,
            connections.len()
        );
        Ok(receiver)
    }

    /// Forget a connection
    pub fn unregister(&self, handle: &str) -> Result<bool> {
        let mut connections = self
            .connections
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("connections"))?;
        Ok(connections.remove(handle).is_some())
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_connected(&self, handle: &str) -> bool {
        self.connections
            .read()
            .map(|c| c.contains_key(handle))
            .unwrap_or(false)
    }
}

#[async_trait]
impl Broadcaster for ConnectionHub {
    async fn deliver(&self, handle: &str, event: ServerEvent) -> Result<()> {
        let sender = {
            let connections = self
                .connections
                .read()
                .map_err(|_| MatchmakingError::lock_poisoned("connections"))?;
            connections.get(handle).cloned()
        };

        let Some(sender) = sender else {
            return Err(MatchmakingError::InternalError {
                message: format!("Connection {} is not registered", handle),
            }
            .into());
        };

        // A slow reader must not stall the sender's session.
        sender.try_send(event).map_err(|e| {
            MatchmakingError::InternalError {
                message: format!("Failed to deliver to connection {}: {}", handle, e),
            }
            .into()
        })
    }
}

/// Broadcaster that records deliveries instead of sending them
#[derive(Debug, Default)]
pub struct MockBroadcaster {
    delivered: Mutex<Vec<(TransportHandle, ServerEvent)>>,
}

impl MockBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events delivered to one connection, oldest first
    pub fn events_for(&self, handle: &str) -> Vec<ServerEvent> {
        self.delivered
            .lock()
            .map(|delivered| {
                delivered
                    .iter()
                    .filter(|(h, _)| h == handle)
                    .map(|(_, event)| event.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every delivery so far
    pub fn all(&self) -> Vec<(TransportHandle, ServerEvent)> {
        self.delivered
            .lock()
            .map(|delivered| delivered.clone())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut delivered) = self.delivered.lock() {
            delivered.clear();
        }
    }
}

#[async_trait]
impl Broadcaster for MockBroadcaster {
    async fn deliver(&self, handle: &str, event: ServerEvent) -> Result<()> {
        if let Ok(mut delivered) = self.delivered.lock() {
            delivered.push((handle.to_string(), event));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hub_delivers_to_registered_connection() {
        let hub = ConnectionHub::new(4);
        let mut receiver = hub.register("conn-1").unwrap();
        assert_eq!(hub.connection_count(), 1);
        assert!(hub.is_connected("conn-1"));

        hub.deliver("conn-1", ServerEvent::queue_left()).await.unwrap();
        assert_eq!(receiver.recv().await, Some(ServerEvent::queue_left()));
    }

    #[tokio::test]
    async fn test_hub_rejects_unknown_connection() {
        let hub = ConnectionHub::new(4);
        assert!(hub
            .deliver("conn-missing", ServerEvent::queue_left())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_hub_full_buffer_fails_fast() {
        let hub = ConnectionHub::new(1);
        let _receiver = hub.register("conn-1").unwrap();

        hub.deliver("conn-1", ServerEvent::queue_left()).await.unwrap();
        assert!(hub.deliver("conn-1", ServerEvent::queue_left()).await.is_err());
    }

    #[tokio::test]
    async fn test_hub_unregister() {
        let hub = ConnectionHub::new(4);
        let _receiver = hub.register("conn-1").unwrap();

        assert!(hub.unregister("conn-1").unwrap());
        assert!(!hub.unregister("conn-1").unwrap());
        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_mock_broadcaster_records_by_handle() {
        let mock = MockBroadcaster::new();
        mock.deliver("a", ServerEvent::queue_joined(1)).await.unwrap();
        mock.deliver("b", ServerEvent::queue_left()).await.unwrap();

        assert_eq!(mock.events_for("a"), vec![ServerEvent::queue_joined(1)]);
        assert_eq!(mock.all().len(), 2);

        mock.clear();
        assert!(mock.all().is_empty());
    }
}
