//! WebSocket message protocol for the live feed.

use serde::{Deserialize, Serialize};

use fleetwatch_domain::{AlertTriggeredEvent, PositionEvent, StatusChangeEvent};

/// Channels a client can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WsChannel {
    /// Position updates for all (or filtered) vehicles
    Positions,
    /// Status transitions
    Status,
    /// Triggered alerts
    Alerts,
}

/// Client-to-server messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Subscribe to channels, optionally narrowed to specific vehicles.
    /// An empty vehicle list means the global broadcast.
    Subscribe {
        channels: Vec<WsChannel>,
        #[serde(default)]
        vehicles: Vec<String>,
    },
    Unsubscribe {
        channels: Vec<WsChannel>,
        #[serde(default)]
        vehicles: Vec<String>,
    },
    Ping {
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
    },
}

/// Server-to-client messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Position { data: PositionEvent },
    StatusChange { data: StatusChangeEvent },
    Alert { data: AlertTriggeredEvent },
    Subscribed { channels: Vec<WsChannel> },
    Pong { timestamp: Option<i64> },
    Error { message: String },
}
