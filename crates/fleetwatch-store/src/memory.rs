//! In-memory implementations of the durable-store repository traits.
//!
//! The durable store is an external collaborator; these stand-ins back the
//! all-in-one binary and the pipeline tests. Keyed exactly like the real
//! store: natural ids, uniqueness where the traits demand it.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use fleetwatch_domain::{
    AlertRule, AlertRuleRepository, DomainResult, NotificationChannel, NotificationRecord,
    NotificationRepository, NotificationStatus, PositionEvent, PositionRepository, TriggerState,
    TriggerStateRepository, VehicleState, VehicleStateRepository,
};

/// Position history keyed by event id, with a per-vehicle index.
#[derive(Default)]
pub struct InMemoryPositionRepository {
    by_event: Arc<RwLock<HashMap<Uuid, PositionEvent>>>,
    by_vehicle: Arc<RwLock<HashMap<String, Vec<Uuid>>>>,
}

impl InMemoryPositionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PositionRepository for InMemoryPositionRepository {
    async fn insert(&self, event: &PositionEvent) -> DomainResult<bool> {
        let mut by_event = self.by_event.write().await;
        if by_event.contains_key(&event.event_id) {
            return Ok(false);
        }
        by_event.insert(event.event_id, event.clone());
        self.by_vehicle
            .write()
            .await
            .entry(event.vehicle_id.clone())
            .or_default()
            .push(event.event_id);
        Ok(true)
    }

    async fn recent_for_vehicle(
        &self,
        vehicle_id: &str,
        limit: usize,
    ) -> DomainResult<Vec<PositionEvent>> {
        let by_vehicle = self.by_vehicle.read().await;
        let by_event = self.by_event.read().await;
        let ids = by_vehicle.get(vehicle_id).cloned().unwrap_or_default();
        let mut events: Vec<PositionEvent> = ids
            .iter()
            .filter_map(|id| by_event.get(id).cloned())
            .collect();
        events.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        events.truncate(limit);
        Ok(events)
    }
}

#[derive(Default)]
pub struct InMemoryVehicleStateRepository {
    states: Arc<RwLock<HashMap<String, VehicleState>>>,
}

impl InMemoryVehicleStateRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VehicleStateRepository for InMemoryVehicleStateRepository {
    async fn get(&self, vehicle_id: &str) -> DomainResult<Option<VehicleState>> {
        Ok(self.states.read().await.get(vehicle_id).cloned())
    }

    async fn upsert(&self, state: &VehicleState) -> DomainResult<()> {
        self.states
            .write()
            .await
            .insert(state.vehicle_id.clone(), state.clone());
        Ok(())
    }

    async fn list(&self) -> DomainResult<Vec<VehicleState>> {
        Ok(self.states.read().await.values().cloned().collect())
    }
}

/// Alert rules; seeded at startup or by tests, read-only to the engine.
#[derive(Default)]
pub struct InMemoryAlertRuleRepository {
    rules: Arc<RwLock<Vec<AlertRule>>>,
}

impl InMemoryAlertRuleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, rules: Vec<AlertRule>) {
        *self.rules.write().await = rules;
    }
}

#[async_trait]
impl AlertRuleRepository for InMemoryAlertRuleRepository {
    async fn enabled_for_vehicle(&self, vehicle_id: &str) -> DomainResult<Vec<AlertRule>> {
        Ok(self
            .rules
            .read()
            .await
            .iter()
            .filter(|r| r.enabled && r.scope.matches(vehicle_id))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryTriggerStateRepository {
    states: Arc<RwLock<HashMap<(String, Uuid), TriggerState>>>,
}

impl InMemoryTriggerStateRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TriggerStateRepository for InMemoryTriggerStateRepository {
    async fn get(&self, vehicle_id: &str, rule_id: Uuid) -> DomainResult<Option<TriggerState>> {
        Ok(self
            .states
            .read()
            .await
            .get(&(vehicle_id.to_string(), rule_id))
            .cloned())
    }

    async fn upsert(&self, state: &TriggerState) -> DomainResult<()> {
        self.states
            .write()
            .await
            .insert((state.vehicle_id.clone(), state.rule_id), state.clone());
        Ok(())
    }
}

/// Notification records with the (source event, recipient, channel)
/// uniqueness constraint enforced on insert.
#[derive(Default)]
pub struct InMemoryNotificationRepository {
    records: Arc<RwLock<HashMap<Uuid, NotificationRecord>>>,
    dedup: Arc<RwLock<HashMap<(Uuid, String, NotificationChannel), Uuid>>>,
}

impl InMemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationRepository for InMemoryNotificationRepository {
    async fn insert(&self, record: &NotificationRecord) -> DomainResult<bool> {
        let key = (
            record.source_event_id,
            record.recipient_id.clone(),
            record.channel,
        );
        let mut dedup = self.dedup.write().await;
        if dedup.contains_key(&key) {
            return Ok(false);
        }
        dedup.insert(key, record.id);
        self.records.write().await.insert(record.id, record.clone());
        Ok(true)
    }

    async fn update(&self, record: &NotificationRecord) -> DomainResult<()> {
        self.records.write().await.insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<NotificationRecord>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn mark_read(&self, id: Uuid) -> DomainResult<Option<NotificationRecord>> {
        let mut records = self.records.write().await;
        Ok(records.get_mut(&id).map(|record| {
            record.status = NotificationStatus::Read;
            record.read_at = Some(chrono::Utc::now());
            record.clone()
        }))
    }

    async fn list_for_recipient(
        &self,
        recipient_id: &str,
        status: Option<NotificationStatus>,
    ) -> DomainResult<Vec<NotificationRecord>> {
        let records = self.records.read().await;
        let mut result: Vec<NotificationRecord> = records
            .values()
            .filter(|r| r.recipient_id == recipient_id)
            .filter(|r| status.is_none_or(|s| r.status == s))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }
}
