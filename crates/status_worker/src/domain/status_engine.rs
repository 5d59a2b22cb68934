use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use fleetwatch_domain::{
    derive_status, DomainResult, LiveFeed, PositionEvent, PositionRepository, StatusCache,
    StatusChangeEvent, StatusThresholds, VehicleState, VehicleStateRepository,
};

/// Derives and owns per-vehicle operational status.
///
/// Consumes position events from the bus one partition lane per vehicle, so
/// no state record is ever written concurrently. Derivation always works from
/// the newest source timestamp seen: a late, out-of-order event is kept for
/// history but cannot regress the status.
pub struct StatusEngine {
    positions: Arc<dyn PositionRepository>,
    vehicle_states: Arc<dyn VehicleStateRepository>,
    cache: Arc<dyn StatusCache>,
    live_feed: Arc<dyn LiveFeed>,
    thresholds: StatusThresholds,
}

impl StatusEngine {
    pub fn new(
        positions: Arc<dyn PositionRepository>,
        vehicle_states: Arc<dyn VehicleStateRepository>,
        cache: Arc<dyn StatusCache>,
        live_feed: Arc<dyn LiveFeed>,
        thresholds: StatusThresholds,
    ) -> Self {
        Self {
            positions,
            vehicle_states,
            cache,
            live_feed,
            thresholds,
        }
    }

    /// Process one position event: store it, fold it into the vehicle state,
    /// re-derive status, and emit a status-change event on transition.
    ///
    /// Persistence failures propagate so the bus redelivers; cache and live
    /// feed failures are logged and swallowed.
    pub async fn handle_position(&self, event: PositionEvent) -> DomainResult<()> {
        debug!(
            event_id = %event.event_id,
            vehicle_id = %event.vehicle_id,
            "processing position event"
        );

        // Idempotency guard: a redelivered event that was already stored has
        // already been folded into the state
        if !self.positions.insert(&event).await? {
            debug!(
                event_id = %event.event_id,
                vehicle_id = %event.vehicle_id,
                "event already processed, skipping"
            );
            return Ok(());
        }

        let existing = self.vehicle_states.get(&event.vehicle_id).await?;
        let previous_status = existing.as_ref().map(|s| s.status);

        let mut state = match existing {
            // Newest timestamp wins; older events never overwrite the
            // last-known position
            Some(state) if event.recorded_at < state.last_seen => {
                debug!(
                    event_id = %event.event_id,
                    vehicle_id = %event.vehicle_id,
                    "out-of-order event, keeping newest position"
                );
                state
            }
            _ => state_from_event(&event),
        };

        let age = Utc::now().signed_duration_since(state.last_seen);
        let new_status = derive_status(state.speed, age, &self.thresholds);
        state.status = new_status;
        state.updated_at = Utc::now();

        // Status and last position persist together; failure here triggers
        // redelivery
        self.vehicle_states.upsert(&state).await?;

        if let Err(e) = self.cache.put_state(&state).await {
            warn!(
                vehicle_id = %state.vehicle_id,
                error = %e,
                "status cache update failed, readers fall back to the store"
            );
        }

        self.live_feed.publish_position(&event).await;

        match previous_status {
            Some(previous) if previous == new_status => {}
            _ => {
                let previous =
                    previous_status.unwrap_or(fleetwatch_domain::VehicleStatus::Offline);
                let change = StatusChangeEvent {
                    vehicle_id: state.vehicle_id.clone(),
                    previous,
                    current: new_status,
                    latitude: state.latitude,
                    longitude: state.longitude,
                    changed_at: Utc::now(),
                };
                info!(
                    vehicle_id = %state.vehicle_id,
                    previous = %previous,
                    current = %new_status,
                    "vehicle status changed"
                );
                self.live_feed.publish_status_change(&change).await;
            }
        }

        Ok(())
    }
}

fn state_from_event(event: &PositionEvent) -> VehicleState {
    VehicleState {
        vehicle_id: event.vehicle_id.clone(),
        vehicle_label: event.vehicle_label.clone(),
        // Placeholder until derived below
        status: fleetwatch_domain::VehicleStatus::Offline,
        latitude: event.latitude,
        longitude: event.longitude,
        speed: event.speed,
        heading: event.heading,
        last_seen: event.recorded_at,
        updated_at: Utc::now(),
    }
}
