use anyhow::Context;
use std::sync::Arc;
use tracing::debug;

use fleetwatch_domain::AlertTriggeredEvent;
use fleetwatch_nats::{EventDelivery, EventHandler};

use crate::domain::DispatchService;

/// Build the bus handler for the dispatch service's consumer group on the
/// alerts stream.
pub fn create_alert_processor(service: Arc<DispatchService>) -> EventHandler {
    Arc::new(move |delivery: EventDelivery| {
        let service = Arc::clone(&service);
        Box::pin(async move {
            let event: AlertTriggeredEvent = serde_json::from_slice(&delivery.payload)
                .with_context(|| {
                    format!("failed to decode alert event on {}", delivery.subject)
                })?;

            debug!(
                event_id = %event.event_id,
                partition_key = %delivery.partition_key,
                delivered = delivery.delivered,
                "dispatch service consuming alert event"
            );

            service.handle_alert(&event).await?;
            Ok(())
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use fleetwatch_domain::retry::RetryPolicy;
    use fleetwatch_domain::{
        MockChannelTransport, MockDirectoryLookup, MockLiveFeed, MockNotificationRepository,
    };
    use std::time::Duration;

    fn idle_service() -> Arc<DispatchService> {
        Arc::new(DispatchService::new(
            Arc::new(MockNotificationRepository::new()),
            Arc::new(MockDirectoryLookup::new()),
            Arc::new(MockChannelTransport::new()),
            Arc::new(MockLiveFeed::new()),
            RetryPolicy::default(),
            Duration::from_secs(3),
        ))
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_rejected() {
        let handler = create_alert_processor(idle_service());
        let result = handler(EventDelivery {
            subject: "alerts.truck-001".to_string(),
            partition_key: "truck-001".to_string(),
            payload: Bytes::from_static(b"nope"),
            delivered: 1,
        })
        .await;
        assert!(result.is_err());
    }
}
