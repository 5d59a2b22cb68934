//! Timeout and circuit-breaker guards around the external geospatial and
//! directory interfaces.
//!
//! Every lookup is bounded by a timeout so a slow collaborator cannot stall a
//! partition lane, and a shared breaker short-circuits calls once failures
//! pile up, with automatic half-open retry after the cool-down.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use fleetwatch_domain::retry::{guarded_call, CircuitBreaker};
use fleetwatch_domain::{
    DirectoryLookup, DomainError, DomainResult, GeofencePosition, GeofenceQuery,
    RecipientPreferences,
};

pub struct GuardedGeofenceQuery {
    inner: Arc<dyn GeofenceQuery>,
    breaker: CircuitBreaker,
    timeout: Duration,
}

impl GuardedGeofenceQuery {
    pub fn new(inner: Arc<dyn GeofenceQuery>, breaker: CircuitBreaker, timeout: Duration) -> Self {
        Self {
            inner,
            breaker,
            timeout,
        }
    }
}

#[async_trait]
impl GeofenceQuery for GuardedGeofenceQuery {
    async fn locate(
        &self,
        geofence_id: Uuid,
        latitude: f64,
        longitude: f64,
    ) -> DomainResult<GeofencePosition> {
        guarded_call(&self.breaker, "geofence", || async {
            tokio::time::timeout(
                self.timeout,
                self.inner.locate(geofence_id, latitude, longitude),
            )
            .await
            .map_err(|_| DomainError::LookupTimeout(self.timeout))?
        })
        .await
    }
}

pub struct GuardedDirectory {
    inner: Arc<dyn DirectoryLookup>,
    breaker: CircuitBreaker,
    timeout: Duration,
}

impl GuardedDirectory {
    pub fn new(inner: Arc<dyn DirectoryLookup>, breaker: CircuitBreaker, timeout: Duration) -> Self {
        Self {
            inner,
            breaker,
            timeout,
        }
    }
}

#[async_trait]
impl DirectoryLookup for GuardedDirectory {
    async fn recipients_for_vehicle(&self, vehicle_id: &str) -> DomainResult<Vec<String>> {
        guarded_call(&self.breaker, "directory", || async {
            tokio::time::timeout(self.timeout, self.inner.recipients_for_vehicle(vehicle_id))
                .await
                .map_err(|_| DomainError::LookupTimeout(self.timeout))?
        })
        .await
    }

    async fn preferences(&self, recipient_id: &str) -> DomainResult<RecipientPreferences> {
        guarded_call(&self.breaker, "directory", || async {
            tokio::time::timeout(self.timeout, self.inner.preferences(recipient_id))
                .await
                .map_err(|_| DomainError::LookupTimeout(self.timeout))?
        })
        .await
    }
}
