mod config;
mod telemetry;

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use dispatch_worker::dispatch_worker::{DispatchWorker, DispatchWorkerConfig};
use dispatch_worker::domain::LogChannelTransport;
use fleetwatch_api::{ApiConfig, ApiServer, AppState};
use fleetwatch_domain::LiveFeed;
use fleetwatch_nats::{NatsClient, NatsPositionProducer};
use fleetwatch_runner::Runner;
use fleetwatch_store::{
    InMemoryAlertRuleRepository, InMemoryDirectory, InMemoryGeofenceIndex,
    InMemoryNotificationRepository, InMemoryPositionRepository, InMemoryTriggerStateRepository,
    InMemoryVehicleStateRepository, TtlStatusCache,
};
use rule_worker::rule_worker::{RuleWorker, RuleWorkerConfig};
use status_worker::status_worker::{StatusWorker, StatusWorkerConfig};

use config::ServiceConfig;
use telemetry::init_telemetry;

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = init_telemetry(&config.log_level) {
        eprintln!("Failed to initialize telemetry: {e}");
        std::process::exit(1);
    }

    info!(nats_url = %config.nats_url, "starting fleetwatch-all-in-one");

    let nats_client = match initialize_nats(&config).await {
        Ok(client) => client,
        Err(e) => {
            error!(error = %format!("{e:#}"), "failed to initialize NATS");
            std::process::exit(1);
        }
    };

    // In-memory stand-ins for the durable store and the geospatial/directory
    // collaborators; swap behind the same traits for real backends
    let positions = Arc::new(InMemoryPositionRepository::new());
    let vehicle_states = Arc::new(InMemoryVehicleStateRepository::new());
    let alert_rules = Arc::new(InMemoryAlertRuleRepository::new());
    let trigger_states = Arc::new(InMemoryTriggerStateRepository::new());
    let notifications = Arc::new(InMemoryNotificationRepository::new());
    let geofences = Arc::new(InMemoryGeofenceIndex::new());
    let directory = Arc::new(InMemoryDirectory::new());
    let cache = Arc::new(TtlStatusCache::new(Duration::from_secs(
        config.cache_ttl_secs,
    )));

    // HTTP surface: ingestion producer plus the live-feed registry
    let producer = Arc::new(NatsPositionProducer::new(
        nats_client.create_publisher_client(),
        config.positions_stream.clone(),
    ));
    let api_config = ApiConfig {
        host: config.api_host.clone(),
        port: config.api_port,
        ws_send_buffer: config.ws_send_buffer,
    };
    let app_state = Arc::new(AppState::new(api_config.clone(), producer));
    let live_feed: Arc<dyn LiveFeed> = Arc::new(app_state.broadcaster());

    let status_worker = match StatusWorker::new(
        Arc::clone(&nats_client),
        positions,
        vehicle_states,
        cache,
        Arc::clone(&live_feed),
        StatusWorkerConfig {
            positions_stream: config.positions_stream.clone(),
            positions_subject: config.positions_subject.clone(),
            consumer_name: config.status_consumer_name.clone(),
            policy: config.consumer_policy(),
            thresholds: config.status_thresholds(),
        },
    )
    .await
    {
        Ok(worker) => worker,
        Err(e) => {
            error!(error = %format!("{e:#}"), "failed to initialize status worker");
            std::process::exit(1);
        }
    };

    let rule_worker = match RuleWorker::new(
        Arc::clone(&nats_client),
        alert_rules,
        trigger_states,
        geofences,
        Arc::clone(&directory) as _,
        RuleWorkerConfig {
            positions_stream: config.positions_stream.clone(),
            positions_subject: config.positions_subject.clone(),
            consumer_name: config.rule_consumer_name.clone(),
            alerts_stream: config.alerts_stream.clone(),
            policy: config.consumer_policy(),
            lookup_timeout: Duration::from_secs(config.lookup_timeout_secs),
            breaker_failure_threshold: config.breaker_failure_threshold,
            breaker_cool_down: Duration::from_secs(config.breaker_cool_down_secs),
        },
    )
    .await
    {
        Ok(worker) => worker,
        Err(e) => {
            error!(error = %format!("{e:#}"), "failed to initialize rule worker");
            std::process::exit(1);
        }
    };

    let dispatch_worker = match DispatchWorker::new(
        Arc::clone(&nats_client),
        notifications,
        directory,
        Arc::new(LogChannelTransport),
        live_feed,
        DispatchWorkerConfig {
            alerts_stream: config.alerts_stream.clone(),
            alerts_subject: config.alerts_subject.clone(),
            consumer_name: config.dispatch_consumer_name.clone(),
            policy: config.consumer_policy(),
            retry: config.dispatch_retry_policy(),
            delivery_timeout: Duration::from_secs(config.delivery_timeout_secs),
        },
    )
    .await
    {
        Ok(worker) => worker,
        Err(e) => {
            error!(error = %format!("{e:#}"), "failed to initialize dispatch worker");
            std::process::exit(1);
        }
    };

    let api_server = ApiServer::new(api_config, app_state);

    Runner::new()
        .with_named_process(
            "api_server",
            Box::new(move |ctx| {
                Box::pin(async move {
                    api_server
                        .run_with_shutdown(ctx.cancelled_owned())
                        .await
                })
            }),
        )
        .with_named_process("status_worker", status_worker.into_runner_process())
        .with_named_process("rule_worker", rule_worker.into_runner_process())
        .with_named_process("dispatch_worker", dispatch_worker.into_runner_process())
        .with_closer(|| async {
            info!("running cleanup tasks");
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(10))
        .run()
        .await
}

async fn initialize_nats(config: &ServiceConfig) -> anyhow::Result<Arc<NatsClient>> {
    info!("initializing NATS");
    let client = Arc::new(
        NatsClient::connect(
            &config.nats_url,
            Duration::from_secs(config.startup_timeout_secs),
        )
        .await?,
    );
    client
        .ensure_stream(&config.positions_stream, "Validated GPS position events")
        .await?;
    client
        .ensure_stream(&config.alerts_stream, "Triggered alert events")
        .await?;
    client.ensure_dead_letter_stream().await?;
    Ok(client)
}
