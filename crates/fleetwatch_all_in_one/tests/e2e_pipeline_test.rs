//! End-to-end pipeline test against in-memory infrastructure: positions flow
//! through the status engine and rule engine, a geofence crossing produces
//! exactly one alert, dispatch creates one record per (recipient, channel)
//! and survives a flaky transport, and every stage pushes to the live feed.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use dispatch_worker::domain::DispatchService;
use rule_worker::domain::RuleEngine;
use status_worker::domain::StatusEngine;

use fleetwatch_domain::retry::RetryPolicy;
use fleetwatch_domain::{
    AlertEventProducer, AlertKind, AlertRule, AlertTriggeredEvent, ChannelTransport, DomainError,
    DomainResult, LiveFeed, NotificationChannel, NotificationRepository, NotificationStatus,
    OutboundNotification, PositionEvent, RuleScope, StatusCache, StatusChangeEvent,
    StatusThresholds, VehicleState, VehicleStateRepository, VehicleStatus,
};
use fleetwatch_store::{
    CachedStatusReader, Geofence, GeofenceShape, InMemoryAlertRuleRepository, InMemoryDirectory,
    InMemoryGeofenceIndex, InMemoryNotificationRepository, InMemoryPositionRepository,
    InMemoryTriggerStateRepository, InMemoryVehicleStateRepository, TtlStatusCache,
};

/// Captures everything pushed to live subscribers.
#[derive(Default)]
struct CollectingLiveFeed {
    positions: Mutex<Vec<PositionEvent>>,
    status_changes: Mutex<Vec<StatusChangeEvent>>,
    alerts: Mutex<Vec<AlertTriggeredEvent>>,
}

#[async_trait]
impl LiveFeed for CollectingLiveFeed {
    async fn publish_position(&self, event: &PositionEvent) {
        self.positions.lock().await.push(event.clone());
    }

    async fn publish_status_change(&self, event: &StatusChangeEvent) {
        self.status_changes.lock().await.push(event.clone());
    }

    async fn publish_alert(&self, event: &AlertTriggeredEvent) {
        self.alerts.lock().await.push(event.clone());
    }
}

/// Collects alerts the rule engine publishes, standing in for the bus topic.
#[derive(Default)]
struct CollectingAlertProducer {
    alerts: Mutex<Vec<AlertTriggeredEvent>>,
}

#[async_trait]
impl AlertEventProducer for CollectingAlertProducer {
    async fn publish(&self, event: &AlertTriggeredEvent) -> DomainResult<()> {
        self.alerts.lock().await.push(event.clone());
        Ok(())
    }
}

/// Fails the first `failures` deliveries for each (recipient, channel) pair,
/// then succeeds.
struct FlakyTransport {
    failures: u32,
    attempts: Mutex<HashMap<(String, NotificationChannel), u32>>,
    delivered: Mutex<Vec<OutboundNotification>>,
}

impl FlakyTransport {
    fn failing_first(failures: u32) -> Self {
        Self {
            failures,
            attempts: Mutex::new(HashMap::new()),
            delivered: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ChannelTransport for FlakyTransport {
    async fn deliver(&self, notification: &OutboundNotification) -> DomainResult<()> {
        let key = (notification.recipient_id.clone(), notification.channel);
        let mut attempts = self.attempts.lock().await;
        let seen = attempts.entry(key).or_insert(0);
        *seen += 1;
        if *seen <= self.failures {
            return Err(DomainError::DeliveryFailed("gateway 503".to_string()));
        }
        self.delivered.lock().await.push(notification.clone());
        Ok(())
    }
}

/// A cache tier that is down hard.
struct BrokenCache;

#[async_trait]
impl StatusCache for BrokenCache {
    async fn get_status(&self, _vehicle_id: &str) -> DomainResult<Option<VehicleStatus>> {
        Err(DomainError::CacheError("connection refused".to_string()))
    }

    async fn put_state(&self, _state: &VehicleState) -> DomainResult<()> {
        Err(DomainError::CacheError("connection refused".to_string()))
    }
}

fn position(vehicle: &str, lat: f64, lon: f64, speed: f64, age_secs: i64) -> PositionEvent {
    PositionEvent {
        event_id: Uuid::new_v4(),
        vehicle_id: vehicle.to_string(),
        vehicle_label: Some(format!("TRK-{vehicle}")),
        latitude: lat,
        longitude: lon,
        altitude: None,
        speed: Some(speed),
        heading: Some(90),
        accuracy: Some(5.0),
        satellites: Some(10),
        recorded_at: Utc::now() - ChronoDuration::seconds(age_secs),
        ingested_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_geofence_crossing_flows_to_notifications_and_live_feed() {
    // Geofence: 500 m circle around the depot
    let geofences = Arc::new(InMemoryGeofenceIndex::new());
    let fence = Geofence {
        id: Uuid::new_v4(),
        name: "depot".to_string(),
        shape: GeofenceShape::Circle {
            center_lat: 48.8566,
            center_lon: 2.3522,
            radius_m: 500.0,
        },
    };
    let fence_id = fence.id;
    geofences.upsert(fence).await;

    let rules = InMemoryAlertRuleRepository::new();
    rules
        .seed(vec![AlertRule {
            id: Uuid::new_v4(),
            name: "depot".to_string(),
            kind: AlertKind::GeofenceEnter,
            scope: RuleScope::AllVehicles,
            threshold_kmh: None,
            threshold_secs: None,
            geofence_id: Some(fence_id),
            enabled: true,
        }])
        .await;

    // Directory: one responsible user, reachable over push and email
    let directory = Arc::new(InMemoryDirectory::new());
    directory.assign("truck-001", vec!["user-ops".to_string()]).await;
    directory
        .set_preferences(
            "user-ops",
            vec![NotificationChannel::Push, NotificationChannel::Email],
        )
        .await;

    let live_feed = Arc::new(CollectingLiveFeed::default());
    let alert_bus = Arc::new(CollectingAlertProducer::default());

    let status_engine = StatusEngine::new(
        Arc::new(InMemoryPositionRepository::new()),
        Arc::new(InMemoryVehicleStateRepository::new()),
        Arc::new(TtlStatusCache::new(Duration::from_secs(30))),
        Arc::clone(&live_feed) as Arc<dyn LiveFeed>,
        StatusThresholds::default(),
    );

    let rule_engine = RuleEngine::new(
        Arc::new(rules),
        Arc::new(InMemoryTriggerStateRepository::new()),
        geofences,
        Arc::clone(&directory) as _,
        Arc::clone(&alert_bus) as Arc<dyn AlertEventProducer>,
    );

    let notifications = Arc::new(InMemoryNotificationRepository::new());
    let transport = Arc::new(FlakyTransport::failing_first(2));
    let dispatch = DispatchService::new(
        Arc::clone(&notifications) as Arc<dyn NotificationRepository>,
        directory,
        Arc::clone(&transport) as Arc<dyn ChannelTransport>,
        Arc::clone(&live_feed) as Arc<dyn LiveFeed>,
        RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5)),
        Duration::from_secs(3),
    );

    // Approach from outside the fence, then cross in
    let approach = position("truck-001", 48.8566, 2.3672, 45.0, 20);
    let crossing = position("truck-001", 48.8566, 2.3530, 40.0, 5);

    for event in [&approach, &crossing] {
        status_engine.handle_position(event.clone()).await.unwrap();
        rule_engine.evaluate(event).await.unwrap();
    }

    // Exactly one GEOFENCE_ENTER alert left the rule engine
    let alerts = alert_bus.alerts.lock().await.clone();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::GeofenceEnter);
    assert_eq!(alerts[0].recipient_ids, vec!["user-ops".to_string()]);

    // Bus topic B: dispatch consumes the alert
    dispatch.handle_alert(&alerts[0]).await.unwrap();

    // One record per (recipient, channel), delivered despite two transport
    // failures per channel
    let records = notifications.list_for_recipient("user-ops", None).await.unwrap();
    assert_eq!(records.len(), 2);
    for record in &records {
        assert_eq!(record.status, NotificationStatus::Delivered);
        assert_eq!(record.retry_count, 2);
    }
    assert_eq!(transport.delivered.lock().await.len(), 2);

    // Live feed saw both positions, the offline->active transition, and the
    // alert push
    assert_eq!(live_feed.positions.lock().await.len(), 2);
    assert_eq!(live_feed.status_changes.lock().await.len(), 1);
    assert_eq!(live_feed.alerts.lock().await.len(), 1);
}

#[tokio::test]
async fn test_redelivered_alert_produces_no_duplicate_records() {
    let directory = Arc::new(InMemoryDirectory::new());
    directory
        .set_preferences("user-ops", vec![NotificationChannel::Push])
        .await;

    let notifications = Arc::new(InMemoryNotificationRepository::new());
    let transport = Arc::new(FlakyTransport::failing_first(0));
    let live_feed = Arc::new(CollectingLiveFeed::default());

    let dispatch = DispatchService::new(
        Arc::clone(&notifications) as Arc<dyn NotificationRepository>,
        directory,
        Arc::clone(&transport) as Arc<dyn ChannelTransport>,
        live_feed,
        RetryPolicy::new(1, Duration::from_millis(1), Duration::from_millis(5)),
        Duration::from_secs(3),
    );

    let alert = AlertTriggeredEvent {
        event_id: Uuid::new_v4(),
        rule_id: Uuid::new_v4(),
        vehicle_id: "truck-001".to_string(),
        vehicle_label: None,
        kind: AlertKind::SpeedLimit,
        severity: AlertKind::SpeedLimit.severity(),
        message: "speeding".to_string(),
        latitude: 48.85,
        longitude: 2.35,
        triggered_at: Utc::now(),
        recipient_ids: vec!["user-ops".to_string()],
    };

    // At-least-once delivery from the bus: the same alert arrives twice
    dispatch.handle_alert(&alert).await.unwrap();
    dispatch.handle_alert(&alert).await.unwrap();

    let records = notifications.list_for_recipient("user-ops", None).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(transport.delivered.lock().await.len(), 1);
}

#[tokio::test]
async fn test_cache_outage_does_not_change_status_correctness() {
    let vehicle_states = Arc::new(InMemoryVehicleStateRepository::new());
    let live_feed = Arc::new(CollectingLiveFeed::default());

    let engine = StatusEngine::new(
        Arc::new(InMemoryPositionRepository::new()),
        Arc::clone(&vehicle_states) as _,
        Arc::new(BrokenCache),
        Arc::clone(&live_feed) as Arc<dyn LiveFeed>,
        StatusThresholds::default(),
    );

    engine
        .handle_position(position("truck-001", 48.85, 2.35, 40.0, 30))
        .await
        .unwrap();

    // Status derived and persisted despite the cache being down
    let state = vehicle_states.get("truck-001").await.unwrap().unwrap();
    assert_eq!(state.status, VehicleStatus::Active);

    // Reads degrade to the durable store
    let reader = CachedStatusReader::new(Arc::new(BrokenCache), vehicle_states);
    assert_eq!(
        reader.status_of("truck-001").await.unwrap(),
        Some(VehicleStatus::Active)
    );
}

#[tokio::test]
async fn test_duplicate_position_event_converges_idempotently() {
    let live_feed = Arc::new(CollectingLiveFeed::default());
    let engine = StatusEngine::new(
        Arc::new(InMemoryPositionRepository::new()),
        Arc::new(InMemoryVehicleStateRepository::new()),
        Arc::new(TtlStatusCache::new(Duration::from_secs(30))),
        Arc::clone(&live_feed) as Arc<dyn LiveFeed>,
        StatusThresholds::default(),
    );

    let event = position("truck-001", 48.85, 2.35, 40.0, 10);
    engine.handle_position(event.clone()).await.unwrap();
    engine.handle_position(event).await.unwrap();

    // The redelivered event changes nothing: one transition, one live push
    assert_eq!(live_feed.status_changes.lock().await.len(), 1);
    assert_eq!(live_feed.positions.lock().await.len(), 1);
}
