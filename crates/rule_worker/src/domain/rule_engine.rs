use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use fleetwatch_domain::{
    AlertEventProducer, AlertKind, AlertRule, AlertRuleRepository, AlertTriggeredEvent,
    DirectoryLookup, DomainError, DomainResult, GeofenceQuery, PositionEvent, TriggerPhase,
    TriggerState, TriggerStateRepository,
};

/// Speed limit applied when a speed rule carries no threshold.
pub const DEFAULT_SPEED_LIMIT_KMH: f64 = 120.0;

/// Speed at or below which a vehicle counts as idle for idle-timeout rules.
pub const IDLE_SPEED_KMH: f64 = 5.0;

/// Evaluates alert rules against incoming position events.
///
/// Trigger state is the only de-duplication mechanism: a rule fires on the
/// rising edge of its predicate and stays silent until the condition clears.
/// State is keyed by (vehicle, rule) and only ever mutated here, inside the
/// vehicle's single partition lane.
pub struct RuleEngine {
    rules: Arc<dyn AlertRuleRepository>,
    trigger_states: Arc<dyn TriggerStateRepository>,
    geofence: Arc<dyn GeofenceQuery>,
    directory: Arc<dyn DirectoryLookup>,
    producer: Arc<dyn AlertEventProducer>,
}

/// Outcome of evaluating one rule's predicate against one event.
enum Predicate {
    Holds,
    Clear,
    /// Not evaluable for this event (missing data, first observation, or a
    /// failed lookup); trigger phase stays untouched
    Skip,
}

impl RuleEngine {
    pub fn new(
        rules: Arc<dyn AlertRuleRepository>,
        trigger_states: Arc<dyn TriggerStateRepository>,
        geofence: Arc<dyn GeofenceQuery>,
        directory: Arc<dyn DirectoryLookup>,
        producer: Arc<dyn AlertEventProducer>,
    ) -> Self {
        Self {
            rules,
            trigger_states,
            geofence,
            directory,
            producer,
        }
    }

    /// Evaluate every enabled rule scoped to the event's vehicle. One rule's
    /// failure never blocks the others; a failed external lookup skips that
    /// rule for this event (fail-open) and is logged.
    pub async fn evaluate(&self, event: &PositionEvent) -> DomainResult<()> {
        let rules = self.rules.enabled_for_vehicle(&event.vehicle_id).await?;
        debug!(
            vehicle_id = %event.vehicle_id,
            rule_count = rules.len(),
            "evaluating alert rules"
        );

        for rule in rules {
            if let Err(e) = self.evaluate_rule(&rule, event).await {
                warn!(
                    rule_id = %rule.id,
                    vehicle_id = %event.vehicle_id,
                    error = %e,
                    "rule evaluation failed, skipping rule for this event"
                );
            }
        }

        Ok(())
    }

    async fn evaluate_rule(&self, rule: &AlertRule, event: &PositionEvent) -> DomainResult<()> {
        let mut state = self
            .trigger_states
            .get(&event.vehicle_id, rule.id)
            .await?
            .unwrap_or_else(|| TriggerState::initial(&event.vehicle_id, rule.id));

        let predicate = match rule.kind {
            AlertKind::SpeedLimit => self.speed_predicate(rule, event),
            AlertKind::OfflineTimeout => self.offline_predicate(rule, event, &state)?,
            AlertKind::IdleTimeout => self.idle_predicate(rule, event, &mut state)?,
            AlertKind::GeofenceEnter | AlertKind::GeofenceExit => {
                self.geofence_predicate(rule, event, &mut state).await?
            }
        };

        match (&predicate, state.phase) {
            (Predicate::Holds, TriggerPhase::Inactive) => {
                self.fire(rule, event, &state).await?;
                state.phase = TriggerPhase::Triggered;
            }
            (Predicate::Clear, TriggerPhase::Triggered) => {
                debug!(
                    rule_id = %rule.id,
                    vehicle_id = %event.vehicle_id,
                    "condition cleared, rule re-armed"
                );
                state.phase = TriggerPhase::Inactive;
            }
            _ => {}
        }

        if state.last_observed.is_none_or(|prev| event.recorded_at > prev) {
            state.last_observed = Some(event.recorded_at);
        }
        state.updated_at = Utc::now();
        self.trigger_states.upsert(&state).await?;
        Ok(())
    }

    fn speed_predicate(&self, rule: &AlertRule, event: &PositionEvent) -> Predicate {
        let Some(speed) = event.speed else {
            return Predicate::Skip;
        };
        let limit = rule.threshold_kmh.unwrap_or(DEFAULT_SPEED_LIMIT_KMH);
        if speed > limit {
            Predicate::Holds
        } else {
            Predicate::Clear
        }
    }

    /// A silent gap longer than the threshold between consecutive reports.
    /// Fires when the vehicle comes back after the gap; the bus is the only
    /// trigger source, so a vehicle that never reports again never fires.
    fn offline_predicate(
        &self,
        rule: &AlertRule,
        event: &PositionEvent,
        state: &TriggerState,
    ) -> DomainResult<Predicate> {
        let threshold = rule_duration_secs(rule)?;
        let Some(last_observed) = state.last_observed else {
            // First report for this (vehicle, rule); nothing to compare against
            return Ok(Predicate::Skip);
        };
        let gap = event
            .recorded_at
            .signed_duration_since(last_observed)
            .num_seconds();
        Ok(if gap > threshold {
            Predicate::Holds
        } else {
            Predicate::Clear
        })
    }

    /// Continuously idle (speed at or below the idle threshold) for longer
    /// than the rule threshold. `idle_since` tracks the start of the current
    /// idle stretch and resets whenever the vehicle moves.
    fn idle_predicate(
        &self,
        rule: &AlertRule,
        event: &PositionEvent,
        state: &mut TriggerState,
    ) -> DomainResult<Predicate> {
        let threshold = rule_duration_secs(rule)?;
        let moving = event.speed.is_some_and(|s| s > IDLE_SPEED_KMH);

        if moving {
            state.idle_since = None;
            return Ok(Predicate::Clear);
        }

        let idle_since = *state.idle_since.get_or_insert(event.recorded_at);
        let idle_for = event
            .recorded_at
            .signed_duration_since(idle_since)
            .num_seconds();
        Ok(if idle_for > threshold {
            Predicate::Holds
        } else {
            Predicate::Clear
        })
    }

    async fn geofence_predicate(
        &self,
        rule: &AlertRule,
        event: &PositionEvent,
        state: &mut TriggerState,
    ) -> DomainResult<Predicate> {
        let geofence_id = rule.geofence_id.ok_or_else(|| DomainError::RuleEvaluation {
            rule_id: rule.id.to_string(),
            reason: "geofence rule without a geofence id".to_string(),
        })?;

        let position = self
            .geofence
            .locate(geofence_id, event.latitude, event.longitude)
            .await?;

        let previous = state.last_inside.replace(position.inside);
        let Some(previous) = previous else {
            // First observation records membership without firing, so a rule
            // added while vehicles sit inside a fence does not storm
            return Ok(Predicate::Skip);
        };

        debug!(
            rule_id = %rule.id,
            vehicle_id = %event.vehicle_id,
            inside = position.inside,
            was_inside = previous,
            distance_m = position.distance_m,
            "geofence membership evaluated"
        );

        let holds = match rule.kind {
            AlertKind::GeofenceEnter => position.inside,
            AlertKind::GeofenceExit => !position.inside,
            _ => unreachable!("geofence_predicate called for non-geofence rule"),
        };
        Ok(if holds {
            Predicate::Holds
        } else {
            Predicate::Clear
        })
    }

    async fn fire(
        &self,
        rule: &AlertRule,
        event: &PositionEvent,
        state: &TriggerState,
    ) -> DomainResult<()> {
        // Directory failure degrades to an empty recipient list; the alert
        // still reaches the live feed through dispatch
        let recipient_ids = match self
            .directory
            .recipients_for_vehicle(&event.vehicle_id)
            .await
        {
            Ok(recipients) => recipients,
            Err(e) => {
                warn!(
                    vehicle_id = %event.vehicle_id,
                    rule_id = %rule.id,
                    error = %e,
                    "recipient resolution failed, emitting alert without recipients"
                );
                Vec::new()
            }
        };

        let alert = AlertTriggeredEvent {
            event_id: Uuid::new_v4(),
            rule_id: rule.id,
            vehicle_id: event.vehicle_id.clone(),
            vehicle_label: event.vehicle_label.clone(),
            kind: rule.kind,
            severity: rule.kind.severity(),
            message: build_message(rule, event, state),
            latitude: event.latitude,
            longitude: event.longitude,
            triggered_at: Utc::now(),
            recipient_ids,
        };

        info!(
            rule_id = %rule.id,
            vehicle_id = %event.vehicle_id,
            kind = ?rule.kind,
            recipients = alert.recipient_ids.len(),
            "alert triggered"
        );

        self.producer.publish(&alert).await
    }
}

fn rule_duration_secs(rule: &AlertRule) -> DomainResult<i64> {
    rule.threshold_secs.ok_or_else(|| DomainError::RuleEvaluation {
        rule_id: rule.id.to_string(),
        reason: "timeout rule without a duration threshold".to_string(),
    })
}

fn build_message(rule: &AlertRule, event: &PositionEvent, state: &TriggerState) -> String {
    let name = event
        .vehicle_label
        .as_deref()
        .unwrap_or(&event.vehicle_id);

    match rule.kind {
        AlertKind::SpeedLimit => {
            let limit = rule.threshold_kmh.unwrap_or(DEFAULT_SPEED_LIMIT_KMH);
            format!(
                "Vehicle {} exceeded speed limit: {:.1} km/h (limit: {:.0} km/h)",
                name,
                event.speed.unwrap_or_default(),
                limit
            )
        }
        AlertKind::GeofenceEnter => {
            format!("Vehicle {} entered geofence '{}'", name, rule.name)
        }
        AlertKind::GeofenceExit => {
            format!("Vehicle {} exited geofence '{}'", name, rule.name)
        }
        AlertKind::OfflineTimeout => {
            let gap_mins = state
                .last_observed
                .map(|last| {
                    event
                        .recorded_at
                        .signed_duration_since(last)
                        .num_minutes()
                })
                .unwrap_or_default();
            format!("Vehicle {name} was silent for {gap_mins} minutes")
        }
        AlertKind::IdleTimeout => {
            let idle_mins = state
                .idle_since
                .map(|since| {
                    event
                        .recorded_at
                        .signed_duration_since(since)
                        .num_minutes()
                })
                .unwrap_or_default();
            format!("Vehicle {name} has been idle for {idle_mins} minutes")
        }
    }
}
