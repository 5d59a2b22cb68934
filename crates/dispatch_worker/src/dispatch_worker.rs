use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use fleetwatch_domain::retry::RetryPolicy;
use fleetwatch_domain::{ChannelTransport, DirectoryLookup, LiveFeed, NotificationRepository};
use fleetwatch_nats::{ConsumerPolicy, NatsClient, PartitionedConsumer};

use crate::domain::DispatchService;
use crate::nats::create_alert_processor;

pub struct DispatchWorkerConfig {
    pub alerts_stream: String,
    pub alerts_subject: String,
    pub consumer_name: String,
    pub policy: ConsumerPolicy,
    pub retry: RetryPolicy,
    pub delivery_timeout: Duration,
}

/// Dispatch service wired to its consumer group on the alerts stream.
pub struct DispatchWorker {
    consumer: PartitionedConsumer,
}

impl DispatchWorker {
    pub async fn new(
        nats_client: Arc<NatsClient>,
        notifications: Arc<dyn NotificationRepository>,
        directory: Arc<dyn DirectoryLookup>,
        transport: Arc<dyn ChannelTransport>,
        live_feed: Arc<dyn LiveFeed>,
        config: DispatchWorkerConfig,
    ) -> anyhow::Result<Self> {
        info!("initializing dispatch worker");

        let service = Arc::new(DispatchService::new(
            notifications,
            directory,
            transport,
            live_feed,
            config.retry,
            config.delivery_timeout,
        ));

        let consumer = PartitionedConsumer::new(
            nats_client.create_consumer_client(),
            nats_client.create_publisher_client(),
            &config.alerts_stream,
            &config.consumer_name,
            &config.alerts_subject,
            config.policy,
            create_alert_processor(service),
        )
        .await?;

        info!("dispatch worker initialized");
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
