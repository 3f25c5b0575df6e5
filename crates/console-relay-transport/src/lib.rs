//! Control protocol and transport bridge between agent and panel.
//!
//! Provides:
//! - Wire protocol (tagged JSON messages, one named channel per kind)
//! - In-process bridge with RAII subscriptions
//! - WebSocket adapter (feature: websocket)

pub mod bridge;
pub mod protocol;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use bridge::{AgentEndpoint, Bridge, BridgeHost, Endpoint, Outbox, PanelEndpoint, SendError, Subscription};
pub use protocol::{AgentMessage, Channel, PanelMessage, Routed};
