use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::alert::{AlertKind, Severity};

/// Maximum length of the stored content preview.
pub const PREVIEW_MAX_LEN: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationChannel {
    Push,
    Email,
    Webhook,
}

impl std::fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Push => write!(f, "PUSH"),
            Self::Email => write!(f, "EMAIL"),
            Self::Webhook => write!(f, "WEBHOOK"),
        }
    }
}

/// Delivery lifecycle. DELIVERED, FAILED and READ are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Delivered,
    Failed,
    Read,
}

/// What a notification is about: an alert kind, or a direct send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    Alert(AlertKind),
    Direct,
}

/// One delivery attempt stream to one recipient over one channel.
///
/// Lifecycle is owned by the dispatch service. Uniqueness on
/// (source_event_id, recipient_id, channel) keeps bus redelivery from
/// producing duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub channel: NotificationChannel,
    pub recipient_id: String,
    pub subject: String,
    pub preview: String,
    pub status: NotificationStatus,
    pub retry_count: u32,
    pub error: Option<String>,
    /// Alert event id or direct-send request id this record belongs to
    pub source_event_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
}

impl NotificationRecord {
    pub fn pending(
        kind: NotificationKind,
        channel: NotificationChannel,
        recipient_id: &str,
        subject: &str,
        body: &str,
        source_event_id: Uuid,
    ) -> Self {
        let mut preview = body.to_string();
        preview.truncate(PREVIEW_MAX_LEN);
        Self {
            id: Uuid::new_v4(),
            kind,
            channel,
            recipient_id: recipient_id.to_string(),
            subject: subject.to_string(),
            preview,
            status: NotificationStatus::Pending,
            retry_count: 0,
            error: None,
            source_event_id,
            created_at: Utc::now(),
            sent_at: None,
            delivered_at: None,
            read_at: None,
        }
    }
}

/// A formatted notification handed to the channel transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundNotification {
    pub channel: NotificationChannel,
    pub recipient_id: String,
    pub subject: String,
    pub body: String,
    pub severity: Severity,
}

/// Direct (non-alert) send request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendRequest {
    /// Idempotency key for the request
    pub request_id: Uuid,
    pub recipient_ids: Vec<String>,
    pub subject: String,
    pub body: String,
    pub severity: Severity,
}

/// A recipient's enabled channels, resolved from the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientPreferences {
    pub recipient_id: String,
    pub channels: Vec<NotificationChannel>,
}
