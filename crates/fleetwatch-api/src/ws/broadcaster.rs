//! Live fan-out over WebSocket.
//!
//! Fire-and-forget: every failure stays inside the broadcaster. Nothing here
//! may propagate an error into a pipeline worker.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use fleetwatch_domain::{AlertTriggeredEvent, LiveFeed, PositionEvent, StatusChangeEvent};

use super::connection::ConnectionRegistry;
use super::message::{ServerMessage, WsChannel};

#[derive(Clone)]
pub struct WsBroadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl WsBroadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub fn connection_count(&self) -> usize {
        self.registry.connection_count()
    }
}

#[async_trait]
impl LiveFeed for WsBroadcaster {
    async fn publish_position(&self, event: &PositionEvent) {
        debug!(vehicle_id = %event.vehicle_id, "broadcasting position update");
        let message = ServerMessage::Position {
            data: event.clone(),
        };
        self.registry
            .broadcast_vehicle(WsChannel::Positions, &event.vehicle_id, &message);
    }

    async fn publish_status_change(&self, event: &StatusChangeEvent) {
        debug!(
            vehicle_id = %event.vehicle_id,
            previous = %event.previous,
            current = %event.current,
            "broadcasting status change"
        );
        let message = ServerMessage::StatusChange {
            data: event.clone(),
        };
        self.registry
            .broadcast_vehicle(WsChannel::Status, &event.vehicle_id, &message);
    }

    async fn publish_alert(&self, event: &AlertTriggeredEvent) {
        debug!(
            vehicle_id = %event.vehicle_id,
            kind = ?event.kind,
            "broadcasting alert"
        );
        let message = ServerMessage::Alert {
            data: event.clone(),
        };
        // Alerts go to the global broadcast address
        self.registry.broadcast(WsChannel::Alerts, &message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::connection::{ConnectionId, ConnectionState};
    use chrono::Utc;
    use fleetwatch_domain::{AlertKind, Severity, VehicleStatus};
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn position(vehicle: &str) -> PositionEvent {
        PositionEvent {
            event_id: Uuid::new_v4(),
            vehicle_id: vehicle.to_string(),
            vehicle_label: None,
            latitude: 1.0,
            longitude: 2.0,
            altitude: None,
            speed: Some(40.0),
            heading: None,
            accuracy: None,
            satellites: None,
            recorded_at: Utc::now(),
            ingested_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_broadcast_with_no_connections_is_harmless() {
        let broadcaster = WsBroadcaster::new(Arc::new(ConnectionRegistry::new()));
        broadcaster.publish_position(&position("truck-001")).await;

        broadcaster
            .publish_status_change(&StatusChangeEvent {
                vehicle_id: "truck-001".to_string(),
                previous: VehicleStatus::Idle,
                current: VehicleStatus::Active,
                latitude: 1.0,
                longitude: 2.0,
                changed_at: Utc::now(),
            })
            .await;
    }

    #[tokio::test]
    async fn test_alert_reaches_global_subscribers() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, mut rx) = mpsc::channel(8);
        let mut state = ConnectionState::new(ConnectionId::generate(), tx);
        // Vehicle filter does not narrow the global alert channel
        state.subscribe(&[WsChannel::Alerts], &["truck-999".to_string()]);
        registry.register(state);

        let broadcaster = WsBroadcaster::new(Arc::clone(&registry));
        broadcaster
            .publish_alert(&AlertTriggeredEvent {
                event_id: Uuid::new_v4(),
                rule_id: Uuid::new_v4(),
                vehicle_id: "truck-001".to_string(),
                vehicle_label: None,
                kind: AlertKind::SpeedLimit,
                severity: Severity::Warning,
                message: "speeding".to_string(),
                latitude: 1.0,
                longitude: 2.0,
                triggered_at: Utc::now(),
                recipient_ids: vec![],
            })
            .await;

        assert!(matches!(
            rx.try_recv().unwrap(),
            ServerMessage::Alert { .. }
        ));
    }

    #[tokio::test]
    async fn test_position_respects_vehicle_filter() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, mut rx) = mpsc::channel(8);
        let mut state = ConnectionState::new(ConnectionId::generate(), tx);
        state.subscribe(&[WsChannel::Positions], &["truck-001".to_string()]);
        registry.register(state);

        let broadcaster = WsBroadcaster::new(Arc::clone(&registry));
        broadcaster.publish_position(&position("truck-002")).await;
        assert!(rx.try_recv().is_err());

        broadcaster.publish_position(&position("truck-001")).await;
        assert!(matches!(
            rx.try_recv().unwrap(),
            ServerMessage::Position { .. }
        ));
    }
}
