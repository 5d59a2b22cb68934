use anyhow::Context;
use async_trait::async_trait;
use fleetwatch_domain::{DomainError, DomainResult, PositionEvent, PositionEventProducer};
use std::sync::Arc;
use tracing::debug;

use crate::traits::JetStreamPublisher;

/// JetStream producer for position events. The vehicle id is the subject's
/// last token, which routes every event for a vehicle to the same ordered
/// partition lane.
pub struct NatsPositionProducer {
    jetstream: Arc<dyn JetStreamPublisher>,
    base_subject: String,
}

impl NatsPositionProducer {
    pub fn new(jetstream: Arc<dyn JetStreamPublisher>, base_subject: String) -> Self {
        Self {
            jetstream,
            base_subject,
        }
    }
}

#[async_trait]
impl PositionEventProducer for NatsPositionProducer {
    async fn publish(&self, event: &PositionEvent) -> DomainResult<()> {
        let payload = serde_json::to_vec(event)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?;

        let subject = format!("{}.{}", self.base_subject, event.vehicle_id);

        debug!(
            subject = %subject,
            event_id = %event.event_id,
            vehicle_id = %event.vehicle_id,
            size_bytes = payload.len(),
            "publishing position event"
        );

        self.jetstream
            .publish(subject, payload.into())
            .await
            .context("failed to publish position event")
            .map_err(DomainError::RepositoryError)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::MockJetStreamPublisher;
    use bytes::Bytes;
    use chrono::Utc;
    use uuid::Uuid;

    fn event() -> PositionEvent {
        PositionEvent {
            event_id: Uuid::new_v4(),
            vehicle_id: "truck-001".to_string(),
            vehicle_label: None,
            latitude: 48.85,
            longitude: 2.35,
            altitude: None,
            speed: Some(42.0),
            heading: Some(180),
            accuracy: Some(3.0),
            satellites: Some(9),
            recorded_at: Utc::now(),
            ingested_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_keys_subject_by_vehicle() {
        // Arrange
        let mut mock_jetstream = MockJetStreamPublisher::new();
        mock_jetstream
            .expect_publish()
            .withf(|subject: &String, payload: &Bytes| {
                subject == "positions.truck-001" && !payload.is_empty()
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let producer =
            NatsPositionProducer::new(Arc::new(mock_jetstream), "positions".to_string());

        // Act
        let result = producer.publish(&event()).await;

        // Assert
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_publish_failure_maps_to_repository_error() {
        // Arrange
        let mut mock_jetstream = MockJetStreamPublisher::new();
        mock_jetstream
            .expect_publish()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("NATS publish failed")));

        let producer =
            NatsPositionProducer::new(Arc::new(mock_jetstream), "positions".to_string());

        // Act
        let result = producer.publish(&event()).await;

        // Assert
        assert!(matches!(result, Err(DomainError::RepositoryError(_))));
    }

    #[tokio::test]
    async fn test_payload_round_trips() {
        let mut mock_jetstream = MockJetStreamPublisher::new();
        let original = event();
        let expected = original.clone();

        mock_jetstream
            .expect_publish()
            .withf(move |_subject: &String, payload: &Bytes| {
                let decoded: PositionEvent = serde_json::from_slice(payload).unwrap();
                decoded == expected
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let producer =
            NatsPositionProducer::new(Arc::new(mock_jetstream), "positions".to_string());
        assert!(producer.publish(&original).await.is_ok());
    }
}
