//! Fast-read status cache with a short TTL.
//!
//! Best-effort tier: the durable store stays the source of truth, and every
//! cache failure must degrade to a direct store read.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

use fleetwatch_domain::{
    DomainResult, StatusCache, VehicleState, VehicleStateRepository, VehicleStatus,
};

struct CacheEntry {
    status: VehicleStatus,
    expires_at: DateTime<Utc>,
}

/// In-process TTL cache for derived vehicle status.
pub struct TtlStatusCache {
    ttl: Duration,
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl TtlStatusCache {
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            ttl: Duration::from_std(ttl).unwrap_or(Duration::seconds(30)),
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl StatusCache for TtlStatusCache {
    async fn get_status(&self, vehicle_id: &str) -> DomainResult<Option<VehicleStatus>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(vehicle_id)
            .filter(|entry| entry.expires_at > Utc::now())
            .map(|entry| entry.status))
    }

    async fn put_state(&self, state: &VehicleState) -> DomainResult<()> {
        self.entries.write().await.insert(
            state.vehicle_id.clone(),
            CacheEntry {
                status: state.status,
                expires_at: Utc::now() + self.ttl,
            },
        );
        Ok(())
    }
}

/// Cache-aside status reader: cache hit wins, everything else falls back to
/// the durable store. A cache outage only costs latency, never correctness.
pub struct CachedStatusReader {
    cache: Arc<dyn StatusCache>,
    store: Arc<dyn VehicleStateRepository>,
}

impl CachedStatusReader {
    pub fn new(cache: Arc<dyn StatusCache>, store: Arc<dyn VehicleStateRepository>) -> Self {
        Self { cache, store }
    }

    pub async fn status_of(&self, vehicle_id: &str) -> DomainResult<Option<VehicleStatus>> {
        match self.cache.get_status(vehicle_id).await {
            Ok(Some(status)) => return Ok(Some(status)),
            Ok(None) => {}
            Err(e) => {
                warn!(vehicle_id = %vehicle_id, error = %e, "status cache read failed, falling back to store");
            }
        }

        let state = self.store.get(vehicle_id).await?;
        Ok(state.map(|s| s.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetwatch_domain::{DomainError, MockStatusCache, MockVehicleStateRepository};

    fn state(vehicle: &str, status: VehicleStatus) -> VehicleState {
        VehicleState {
            vehicle_id: vehicle.to_string(),
            vehicle_label: None,
            status,
            latitude: 0.5,
            longitude: 0.5,
            speed: Some(20.0),
            heading: None,
            last_seen: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_cache_hit_within_ttl() {
        let cache = TtlStatusCache::new(std::time::Duration::from_secs(30));
        cache
            .put_state(&state("truck-001", VehicleStatus::Active))
            .await
            .unwrap();

        let status = cache.get_status("truck-001").await.unwrap();
        assert_eq!(status, Some(VehicleStatus::Active));
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let cache = TtlStatusCache::new(std::time::Duration::from_millis(0));
        cache
            .put_state(&state("truck-001", VehicleStatus::Idle))
            .await
            .unwrap();

        assert_eq!(cache.get_status("truck-001").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reader_falls_back_to_store_on_cache_failure() {
        let mut cache = MockStatusCache::new();
        cache
            .expect_get_status()
            .times(1)
            .returning(|_| Err(DomainError::CacheError("cache tier down".to_string())));

        let mut store = MockVehicleStateRepository::new();
        store
            .expect_get()
            .times(1)
            .returning(|_| Ok(Some(state("truck-001", VehicleStatus::Offline))));

        let reader = CachedStatusReader::new(Arc::new(cache), Arc::new(store));
        let status = reader.status_of("truck-001").await.unwrap();
        assert_eq!(status, Some(VehicleStatus::Offline));
    }

    #[tokio::test]
    async fn test_reader_skips_store_on_cache_hit() {
        let mut cache = MockStatusCache::new();
        cache
            .expect_get_status()
            .times(1)
            .returning(|_| Ok(Some(VehicleStatus::Active)));

        let mut store = MockVehicleStateRepository::new();
        store.expect_get().times(0);

        let reader = CachedStatusReader::new(Arc::new(cache), Arc::new(store));
        let status = reader.status_of("truck-001").await.unwrap();
        assert_eq!(status, Some(VehicleStatus::Active));
    }
}
