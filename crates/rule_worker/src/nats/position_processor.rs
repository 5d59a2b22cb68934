use anyhow::Context;
use std::sync::Arc;
use tracing::debug;

use fleetwatch_domain::PositionEvent;
use fleetwatch_nats::{EventDelivery, EventHandler};

use crate::domain::RuleEngine;

/// Build the bus handler for the rule engine's consumer group.
pub fn create_position_processor(engine: Arc<RuleEngine>) -> EventHandler {
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
                "rule engine consuming position event"
            );

            engine.evaluate(&event).await?;
            Ok(())
        })
    })
}
