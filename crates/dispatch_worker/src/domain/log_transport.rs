use async_trait::async_trait;
use tracing::info;

use fleetwatch_domain::{ChannelTransport, DomainResult, OutboundNotification};

/// Channel transport for deployments without provider credentials: the
/// handoff is logged and reported successful. The real push/email/webhook
/// providers plug in behind the same trait.
pub struct LogChannelTransport;

#[async_trait]
impl ChannelTransport for LogChannelTransport {
    async fn deliver(&self, notification: &OutboundNotification) -> DomainResult<()> {
        info!(
            channel = %notification.channel,
            recipient_id = %notification.recipient_id,
            subject = %notification.subject,
            severity = ?notification.severity,
            "channel transport not configured, logging notification"
        );
        Ok(())
    }
}
