//! Live-feed connection tracking: per-connection subscription state and the
//! registry used for broadcasting.

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use super::message::{ServerMessage, WsChannel};

/// Unique connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn generate() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// State of a single live-feed connection.
#[derive(Debug)]
pub struct ConnectionState {
    pub id: ConnectionId,
    /// Subscribed channels
    pub subscriptions: HashSet<WsChannel>,
    /// Vehicle filter; empty means the global broadcast
    pub vehicles: HashSet<String>,
    /// Outbound message queue
    pub sender: mpsc::Sender<ServerMessage>,
}

impl ConnectionState {
    pub fn new(id: ConnectionId, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id,
            subscriptions: HashSet::new(),
            vehicles: HashSet::new(),
            sender,
        }
    }

    pub fn subscribe(&mut self, channels: &[WsChannel], vehicles: &[String]) {
        self.subscriptions.extend(channels.iter().copied());
        self.vehicles.extend(vehicles.iter().cloned());
    }

    pub fn unsubscribe(&mut self, channels: &[WsChannel], vehicles: &[String]) {
        for channel in channels {
            self.subscriptions.remove(channel);
        }
        for vehicle in vehicles {
            self.vehicles.remove(vehicle);
        }
    }

    pub fn is_subscribed(&self, channel: WsChannel) -> bool {
        self.subscriptions.contains(&channel)
    }

    /// True when the connection wants updates for this vehicle: either the
    /// global broadcast (no filter) or an explicit subscription.
    pub fn wants_vehicle(&self, vehicle_id: &str) -> bool {
        self.vehicles.is_empty() || self.vehicles.contains(vehicle_id)
    }
}

/// Registry of active live-feed connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<parking_lot::RwLock<ConnectionState>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, state: ConnectionState) -> ConnectionId {
        let id = state.id;
        self.connections
            .insert(id, Arc::new(parking_lot::RwLock::new(state)));
        debug!(connection = %id, total = self.connections.len(), "live-feed connection registered");
        id
    }

    pub fn unregister(&self, id: ConnectionId) {
        self.connections.remove(&id);
        debug!(connection = %id, total = self.connections.len(), "live-feed connection removed");
    }

    pub fn with_connection<F>(&self, id: ConnectionId, f: F)
    where
        F: FnOnce(&mut ConnectionState),
    {
        if let Some(entry) = self.connections.get(&id) {
            f(&mut entry.write());
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Send to every subscriber of a channel. Full queues drop the message
    /// for that connection rather than blocking the caller.
    pub fn broadcast(&self, channel: WsChannel, message: &ServerMessage) {
        for entry in self.connections.iter() {
            let state = entry.read();
            if state.is_subscribed(channel) {
                Self::offer(&state, message);
            }
        }
    }

    /// Send to subscribers of a channel whose vehicle filter covers the
    /// vehicle (the entity-scoped address).
    pub fn broadcast_vehicle(&self, channel: WsChannel, vehicle_id: &str, message: &ServerMessage) {
        for entry in self.connections.iter() {
            let state = entry.read();
            if state.is_subscribed(channel) && state.wants_vehicle(vehicle_id) {
                Self::offer(&state, message);
            }
        }
    }

    fn offer(state: &ConnectionState, message: &ServerMessage) {
        if let Err(e) = state.sender.try_send(message.clone()) {
            debug!(
                connection = %state.id,
                error = %e,
                "dropping live-feed message for slow or closed connection"
            );
        }
    }
}
