//! Real-time event gateway
//!
//! Clients send JSON commands over a WebSocket. The gateway dispatches them to
//! the matchmaking queue and session registry and pushes the resulting events
//! back to the participants involved.

pub mod broadcaster;
pub mod handler;
pub mod messages;
pub mod websocket;

pub use broadcaster::{Broadcaster, ConnectionHub, MockBroadcaster};
pub use handler::{EventGateway, Presence};
pub use messages::{ClientCommand, PlayerView, ServerEvent};
pub use websocket::GatewayState;
