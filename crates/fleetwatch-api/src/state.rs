use std::sync::Arc;

use fleetwatch_domain::PositionEventProducer;

use crate::config::ApiConfig;
use crate::ws::{ConnectionRegistry, WsBroadcaster};

/// Shared state for handlers: the ingestion producer and the live-feed
/// registry.
pub struct AppState {
    pub config: ApiConfig,
    pub producer: Arc<dyn PositionEventProducer>,
    pub registry: Arc<ConnectionRegistry>,
}

impl AppState {
    pub fn new(config: ApiConfig, producer: Arc<dyn PositionEventProducer>) -> Self {
        Self {
            config,
            producer,
            registry: Arc::new(ConnectionRegistry::new()),
        }
    }

    /// The live-feed publisher backed by this state's connection registry.
    pub fn broadcaster(&self) -> WsBroadcaster {
        WsBroadcaster::new(Arc::clone(&self.registry))
    }
}
