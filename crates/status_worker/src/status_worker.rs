use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use fleetwatch_domain::{
    LiveFeed, PositionRepository, StatusCache, StatusThresholds, VehicleStateRepository,
};
use fleetwatch_nats::{ConsumerPolicy, NatsClient, PartitionedConsumer};

use crate::domain::StatusEngine;
use crate::nats::create_position_processor;

pub struct StatusWorkerConfig {
    pub positions_stream: String,
    pub positions_subject: String,
    pub consumer_name: String,
    pub policy: ConsumerPolicy,
    pub thresholds: StatusThresholds,
}

/// Status engine wired to its consumer group on the positions stream.
pub struct StatusWorker {
    consumer: PartitionedConsumer,
}

impl StatusWorker {
    pub async fn new(
        nats_client: Arc<NatsClient>,
        positions: Arc<dyn PositionRepository>,
        vehicle_states: Arc<dyn VehicleStateRepository>,
        cache: Arc<dyn StatusCache>,
        live_feed: Arc<dyn LiveFeed>,
        config: StatusWorkerConfig,
    ) -> anyhow::Result<Self> {
        info!("initializing status worker");

        let engine = Arc::new(StatusEngine::new(
            positions,
            vehicle_states,
            cache,
            live_feed,
            config.thresholds,
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

        info!("status worker initialized");
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
