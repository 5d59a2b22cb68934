use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use fleetwatch_domain::retry::RetryPolicy;
use fleetwatch_domain::{
    AlertTriggeredEvent, ChannelTransport, DirectoryLookup, DomainError, DomainResult, LiveFeed,
    NotificationChannel, NotificationKind, NotificationRecord, NotificationRepository,
    NotificationStatus, OutboundNotification, SendRequest, Severity,
};

/// Drives notification delivery for triggered alerts and direct send
/// requests.
///
/// One record per (recipient, channel); records move PENDING → SENT →
/// DELIVERED, or to FAILED once the retry budget is spent. Delivery failures
/// are terminal on the record, never processing failures — only repository
/// errors bubble up to the bus for redelivery.
pub struct DispatchService {
    notifications: Arc<dyn NotificationRepository>,
    directory: Arc<dyn DirectoryLookup>,
    transport: Arc<dyn ChannelTransport>,
    live_feed: Arc<dyn LiveFeed>,
    retry: RetryPolicy,
    delivery_timeout: Duration,
}

impl DispatchService {
    pub fn new(
        notifications: Arc<dyn NotificationRepository>,
        directory: Arc<dyn DirectoryLookup>,
        transport: Arc<dyn ChannelTransport>,
        live_feed: Arc<dyn LiveFeed>,
        retry: RetryPolicy,
        delivery_timeout: Duration,
    ) -> Self {
        Self {
            notifications,
            directory,
            transport,
            live_feed,
            retry,
            delivery_timeout,
        }
    }

    /// Fan an alert out to every (recipient, enabled channel) pair.
    ///
    /// The live feed is invoked unconditionally, independent of channel
    /// preferences, so connected clients always see the alert.
    pub async fn handle_alert(&self, event: &AlertTriggeredEvent) -> DomainResult<()> {
        info!(
            event_id = %event.event_id,
            vehicle_id = %event.vehicle_id,
            kind = ?event.kind,
            recipients = event.recipient_ids.len(),
            "dispatching alert"
        );

        self.live_feed.publish_alert(event).await;

        for recipient_id in &event.recipient_ids {
            let preferences = match self.directory.preferences(recipient_id).await {
                Ok(preferences) => preferences,
                Err(e) => {
                    warn!(
                        recipient_id = %recipient_id,
                        event_id = %event.event_id,
                        error = %e,
                        "preference lookup failed, skipping recipient"
                    );
                    continue;
                }
            };

            for channel in preferences.channels {
                self.dispatch_one(
                    NotificationKind::Alert(event.kind),
                    channel,
                    recipient_id,
                    event.kind.title(),
                    &event.message,
                    event.severity,
                    event.event_id,
                )
                .await?;
            }
        }

        Ok(())
    }

    /// Deliver a direct, non-alert notification. Idempotent by request id.
    pub async fn handle_send_request(&self, request: &SendRequest) -> DomainResult<()> {
        info!(
            request_id = %request.request_id,
            recipients = request.recipient_ids.len(),
            "dispatching direct send request"
        );

        for recipient_id in &request.recipient_ids {
            let preferences = match self.directory.preferences(recipient_id).await {
                Ok(preferences) => preferences,
                Err(e) => {
                    warn!(
                        recipient_id = %recipient_id,
                        request_id = %request.request_id,
                        error = %e,
                        "preference lookup failed, skipping recipient"
                    );
                    continue;
                }
            };

            for channel in preferences.channels {
                self.dispatch_one(
                    NotificationKind::Direct,
                    channel,
                    recipient_id,
                    &request.subject,
                    &request.body,
                    request.severity,
                    request.request_id,
                )
                .await?;
            }
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn dispatch_one(
        &self,
        kind: NotificationKind,
        channel: NotificationChannel,
        recipient_id: &str,
        subject: &str,
        body: &str,
        severity: Severity,
        source_event_id: Uuid,
    ) -> DomainResult<()> {
        let mut record =
            NotificationRecord::pending(kind, channel, recipient_id, subject, body, source_event_id);

        // Uniqueness on (source event, recipient, channel): a redelivered
        // alert reuses the existing record instead of sending again
        if !self.notifications.insert(&record).await? {
            debug!(
                source_event_id = %source_event_id,
                recipient_id = %recipient_id,
                channel = %channel,
                "notification already dispatched, skipping"
            );
            return Ok(());
        }

        let outbound = OutboundNotification {
            channel,
            recipient_id: recipient_id.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            severity,
        };

        loop {
            match self.attempt_delivery(&outbound).await {
                Ok(()) => {
                    record.status = NotificationStatus::Sent;
                    record.sent_at = Some(Utc::now());
                    self.notifications.update(&record).await?;

                    // The transport hands off synchronously, so the handoff
                    // result doubles as the delivery result
                    record.status = NotificationStatus::Delivered;
                    record.delivered_at = Some(Utc::now());
                    self.notifications.update(&record).await?;

                    debug!(
                        record_id = %record.id,
                        recipient_id = %recipient_id,
                        channel = %channel,
                        retries = record.retry_count,
                        "notification delivered"
                    );
                    return Ok(());
                }
                Err(e) if record.retry_count < self.retry.max_retries => {
                    record.retry_count += 1;
                    record.error = Some(e.to_string());
                    self.notifications.update(&record).await?;

                    let backoff = self.retry.backoff_for(record.retry_count);
                    warn!(
                        record_id = %record.id,
                        channel = %channel,
                        retry = record.retry_count,
                        ?backoff,
                        error = %e,
                        "delivery failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    record.status = NotificationStatus::Failed;
                    record.error = Some(e.to_string());
                    self.notifications.update(&record).await?;

                    warn!(
                        record_id = %record.id,
                        recipient_id = %recipient_id,
                        channel = %channel,
                        retries = record.retry_count,
                        error = %e,
                        "delivery failed terminally"
                    );
                    return Ok(());
                }
            }
        }
    }

    async fn attempt_delivery(&self, outbound: &OutboundNotification) -> DomainResult<()> {
        tokio::time::timeout(self.delivery_timeout, self.transport.deliver(outbound))
            .await
            .map_err(|_| DomainError::DeliveryFailed("channel transport timed out".to_string()))?
    }
}
