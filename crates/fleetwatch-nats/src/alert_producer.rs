use anyhow::Context;
use async_trait::async_trait;
use fleetwatch_domain::{AlertEventProducer, AlertTriggeredEvent, DomainError, DomainResult};
use std::sync::Arc;
use tracing::debug;

use crate::traits::JetStreamPublisher;

/// JetStream producer for alert events, keyed by vehicle id like positions so
/// a vehicle's alerts stay ordered.
pub struct NatsAlertProducer {
    jetstream: Arc<dyn JetStreamPublisher>,
    base_subject: String,
}

impl NatsAlertProducer {
    pub fn new(jetstream: Arc<dyn JetStreamPublisher>, base_subject: String) -> Self {
        Self {
            jetstream,
            base_subject,
        }
    }
}

#[async_trait]
impl AlertEventProducer for NatsAlertProducer {
    async fn publish(&self, event: &AlertTriggeredEvent) -> DomainResult<()> {
        let payload = serde_json::to_vec(event)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?;

        let subject = format!("{}.{}", self.base_subject, event.vehicle_id);

        debug!(
            subject = %subject,
            event_id = %event.event_id,
            kind = ?event.kind,
            "publishing alert event"
        );

        self.jetstream
            .publish(subject, payload.into())
            .await
            .context("failed to publish alert event")
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
    use fleetwatch_domain::{AlertKind, Severity};
    use uuid::Uuid;

    fn alert() -> AlertTriggeredEvent {
        AlertTriggeredEvent {
            event_id: Uuid::new_v4(),
            rule_id: Uuid::new_v4(),
            vehicle_id: "truck-007".to_string(),
            vehicle_label: Some("TRK-007".to_string()),
            kind: AlertKind::SpeedLimit,
            severity: Severity::Warning,
            message: "Vehicle TRK-007 exceeded speed limit".to_string(),
            latitude: 48.85,
            longitude: 2.35,
            triggered_at: Utc::now(),
            recipient_ids: vec!["user-1".to_string()],
        }
    }

    #[tokio::test]
    async fn test_publish_keys_subject_by_vehicle() {
        let mut mock_jetstream = MockJetStreamPublisher::new();
        mock_jetstream
            .expect_publish()
            .withf(|subject: &String, _payload: &Bytes| subject == "alerts.truck-007")
            .times(1)
            .returning(|_, _| Ok(()));

        let producer = NatsAlertProducer::new(Arc::new(mock_jetstream), "alerts".to_string());
        assert!(producer.publish(&alert()).await.is_ok());
    }

    #[tokio::test]
    async fn test_publish_failure_maps_to_repository_error() {
        let mut mock_jetstream = MockJetStreamPublisher::new();
        mock_jetstream
            .expect_publish()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("connection reset")));

        let producer = NatsAlertProducer::new(Arc::new(mock_jetstream), "alerts".to_string());
        let result = producer.publish(&alert()).await;
        assert!(matches!(result, Err(DomainError::RepositoryError(_))));
    }
}
