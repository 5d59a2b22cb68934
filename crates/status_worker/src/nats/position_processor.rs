use anyhow::Context;
use std::sync::Arc;
use tracing::debug;

use fleetwatch_domain::PositionEvent;
use fleetwatch_nats::{EventDelivery, EventHandler};

use crate::domain::StatusEngine;

/// Build the bus handler for the status engine: decode the JSON payload and
/// hand the event to the engine. `Err` rejects the message for redelivery.
pub fn create_position_processor(engine: Arc<StatusEngine>) -> EventHandler {
    Arc::new(move |delivery: EventDelivery| {
        let engine = Arc::clone(&engine);
        Box::pin(async move {
            let event: PositionEvent = serde_json::from_slice(&delivery.payload)
                .with_context(|| {
                    format!("failed to decode position event on {}", delivery.subject)
                })?;

            debug!(
                event_id = %event.event_id,
                partition_key = %delivery.partition_key,
                delivered = delivery.delivered,
                "status engine consuming position event"
            );

            engine.handle_position(event).await?;
            Ok(())
        })
    })
}
