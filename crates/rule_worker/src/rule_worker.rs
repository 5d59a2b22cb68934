use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use fleetwatch_domain::retry::CircuitBreaker;
use fleetwatch_domain::{
    AlertEventProducer, AlertRuleRepository, DirectoryLookup, GeofenceQuery,
    TriggerStateRepository,
};
use fleetwatch_nats::{ConsumerPolicy, NatsAlertProducer, NatsClient, PartitionedConsumer};

use crate::domain::{GuardedDirectory, GuardedGeofenceQuery, RuleEngine};
use crate::nats::create_position_processor;

pub struct RuleWorkerConfig {
    pub positions_stream: String,
    pub positions_subject: String,
    pub consumer_name: String,
    pub alerts_stream: String,
    pub policy: ConsumerPolicy,
    /// Per-lookup timeout for the geospatial and directory interfaces
    pub lookup_timeout: Duration,
    /// Consecutive lookup failures before the breaker opens
    pub breaker_failure_threshold: u32,
    /// Cool-down before a half-open probe
    pub breaker_cool_down: Duration,
}

/// Rule engine wired to its own consumer group on the positions stream,
/// producing onto the alerts stream.
pub struct RuleWorker {
    consumer: PartitionedConsumer,
}

impl RuleWorker {
    pub async fn new(
        nats_client: Arc<NatsClient>,
        rules: Arc<dyn AlertRuleRepository>,
        trigger_states: Arc<dyn TriggerStateRepository>,
        geofence: Arc<dyn GeofenceQuery>,
        directory: Arc<dyn DirectoryLookup>,
        config: RuleWorkerConfig,
    ) -> anyhow::Result<Self> {
        info!("initializing rule worker");

        let producer: Arc<dyn AlertEventProducer> = Arc::new(NatsAlertProducer::new(
            nats_client.create_publisher_client(),
            config.alerts_stream.clone(),
        ));

        // The geospatial and directory interfaces each get their own breaker
        // so one failing collaborator does not gate the other
        let geofence = Arc::new(GuardedGeofenceQuery::new(
            geofence,
            CircuitBreaker::new(config.breaker_failure_threshold, config.breaker_cool_down),
            config.lookup_timeout,
        ));
        let directory = Arc::new(GuardedDirectory::new(
            directory,
            CircuitBreaker::new(config.breaker_failure_threshold, config.breaker_cool_down),
            config.lookup_timeout,
        ));

        let engine = Arc::new(RuleEngine::new(
            rules,
            trigger_states,
            geofence,
            directory,
            producer,
        ));

        let consumer = PartitionedConsumer::new(
            nats_client.create_consumer_client(),
            nats_client.create_publisher_client(),
            &config.positions_stream,
            &config.consumer_name,
            &config.positions_subject,
            config.policy,
            create_position_processor(engine),
        )
        .await?;

        info!("rule worker initialized");
        Ok(Self { consumer })
    }

    pub fn into_runner_process(
        self,
    ) -> Box<
        dyn FnOnce(
                CancellationToken,
            ) -> std::pin::Pin<
                Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>,
            > + Send,
    > {
        Box::new(move |ctx| Box::pin(async move { self.consumer.run(ctx).await }))
    }
}
