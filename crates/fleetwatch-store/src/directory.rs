//! In-memory directory: who is responsible for a vehicle, and over which
//! channels they want to hear about it.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use fleetwatch_domain::{
    DirectoryLookup, DomainResult, NotificationChannel, RecipientPreferences,
};

#[derive(Default)]
pub struct InMemoryDirectory {
    assignments: Arc<RwLock<HashMap<String, Vec<String>>>>,
    preferences: Arc<RwLock<HashMap<String, Vec<NotificationChannel>>>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn assign(&self, vehicle_id: &str, recipient_ids: Vec<String>) {
        self.assignments
            .write()
            .await
            .insert(vehicle_id.to_string(), recipient_ids);
    }

    pub async fn set_preferences(&self, recipient_id: &str, channels: Vec<NotificationChannel>) {
        self.preferences
            .write()
            .await
            .insert(recipient_id.to_string(), channels);
    }
}

#[async_trait]
impl DirectoryLookup for InMemoryDirectory {
    async fn recipients_for_vehicle(&self, vehicle_id: &str) -> DomainResult<Vec<String>> {
        Ok(self
            .assignments
            .read()
            .await
            .get(vehicle_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn preferences(&self, recipient_id: &str) -> DomainResult<RecipientPreferences> {
        // Recipients with no explicit preference get push, matching the
        // mobile-first default of the fleet apps
        let channels = self
            .preferences
            .read()
            .await
            .get(recipient_id)
            .cloned()
            .unwrap_or_else(|| vec![NotificationChannel::Push]);
        Ok(RecipientPreferences {
            recipient_id: recipient_id.to_string(),
            channels,
        })
    }
}
