//! Trait seams toward the durable store, the event bus, and the external
//! collaborators (geospatial queries, directory, channel transport, cache,
//! live feed). Infrastructure crates implement these; engines depend only on
//! the traits.

use async_trait::async_trait;
use uuid::Uuid;

use crate::alert::{AlertRule, AlertTriggeredEvent, TriggerState};
use crate::error::DomainResult;
use crate::notification::{
    NotificationChannel, NotificationRecord, NotificationStatus, OutboundNotification,
    RecipientPreferences,
};
use crate::position::PositionEvent;
use crate::status::{StatusChangeEvent, VehicleState, VehicleStatus};

/// Durable position history keyed by event id.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PositionRepository: Send + Sync {
    /// Insert a position; returns false when the event id was already stored,
    /// which is the idempotency signal for bus redelivery.
    async fn insert(&self, event: &PositionEvent) -> DomainResult<bool>;

    /// Most recent positions for a vehicle, newest first.
    async fn recent_for_vehicle(
        &self,
        vehicle_id: &str,
        limit: usize,
    ) -> DomainResult<Vec<PositionEvent>>;
}

/// Durable per-vehicle state, written only by the status engine.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait VehicleStateRepository: Send + Sync {
    async fn get(&self, vehicle_id: &str) -> DomainResult<Option<VehicleState>>;

    /// Persist status and last position together.
    async fn upsert(&self, state: &VehicleState) -> DomainResult<()>;

    async fn list(&self) -> DomainResult<Vec<VehicleState>>;
}

/// Alert rules, externally configured and read-only to the rule engine.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AlertRuleRepository: Send + Sync {
    /// Enabled rules whose scope covers the vehicle.
    async fn enabled_for_vehicle(&self, vehicle_id: &str) -> DomainResult<Vec<AlertRule>>;
}

/// Per-(vehicle, rule) trigger state, written only by the rule engine.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait TriggerStateRepository: Send + Sync {
    async fn get(&self, vehicle_id: &str, rule_id: Uuid) -> DomainResult<Option<TriggerState>>;

    async fn upsert(&self, state: &TriggerState) -> DomainResult<()>;
}

/// Notification delivery records, written only by the dispatch service.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Insert a new record; returns false when a record for the same
    /// (source event, recipient, channel) already exists.
    async fn insert(&self, record: &NotificationRecord) -> DomainResult<bool>;

    async fn update(&self, record: &NotificationRecord) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<NotificationRecord>>;

    async fn mark_read(&self, id: Uuid) -> DomainResult<Option<NotificationRecord>>;

    async fn list_for_recipient(
        &self,
        recipient_id: &str,
        status: Option<NotificationStatus>,
    ) -> DomainResult<Vec<NotificationRecord>>;
}

/// Publishes validated position events onto the bus, keyed by vehicle id.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PositionEventProducer: Send + Sync {
    async fn publish(&self, event: &PositionEvent) -> DomainResult<()>;
}

/// Publishes alert events onto the bus, keyed by vehicle id.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AlertEventProducer: Send + Sync {
    async fn publish(&self, event: &AlertTriggeredEvent) -> DomainResult<()>;
}

/// Result of a geofence membership query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeofencePosition {
    pub inside: bool,
    /// Distance from the point to the geofence boundary, in meters
    pub distance_m: f64,
}

/// External geospatial query interface.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait GeofenceQuery: Send + Sync {
    async fn locate(
        &self,
        geofence_id: Uuid,
        latitude: f64,
        longitude: f64,
    ) -> DomainResult<GeofencePosition>;
}

/// External directory interface: recipients and channel preferences.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DirectoryLookup: Send + Sync {
    /// Recipients responsible for a vehicle's alerts.
    async fn recipients_for_vehicle(&self, vehicle_id: &str) -> DomainResult<Vec<String>>;

    async fn preferences(&self, recipient_id: &str) -> DomainResult<RecipientPreferences>;
}

/// External channel transport: hands a formatted notification to the
/// push/email/webhook provider.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    async fn deliver(&self, notification: &OutboundNotification) -> DomainResult<()>;
}

/// Fast-read status cache. Best-effort: callers must treat every error as a
/// miss and fall back to the durable store.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait StatusCache: Send + Sync {
    async fn get_status(&self, vehicle_id: &str) -> DomainResult<Option<VehicleStatus>>;

    async fn put_state(&self, state: &VehicleState) -> DomainResult<()>;
}

/// Best-effort push to live subscribers. Implementations swallow transport
/// errors; nothing here may fail the pipeline.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait LiveFeed: Send + Sync {
    async fn publish_position(&self, event: &PositionEvent);

    async fn publish_status_change(&self, event: &StatusChangeEvent);

    async fn publish_alert(&self, event: &AlertTriggeredEvent);
}
