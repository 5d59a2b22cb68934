//! Minimal runner demo: two named processes, a closer, and graceful
//! shutdown on Ctrl+C.
//!
//! Run with: cargo run --example basic_runner

use fleetwatch_runner::Runner;
use std::time::Duration;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("press Ctrl+C for graceful shutdown");

    Runner::new()
        .with_named_process(
            "ticker",
            Box::new(|ctx| {
                Box::pin(async move {
                    let mut tick = 0u64;
                    loop {
                        tokio::select! {
                            _ = ctx.cancelled() => {
                                tracing::info!(tick, "ticker stopping");
                                break;
                            }
                            _ = tokio::time::sleep(Duration::from_secs(1)) => {
                                tick += 1;
                                tracing::info!(tick, "tick");
                            }
                        }
                    }
                    Ok(())
                })
            }),
        )
        .with_named_process(
            "heartbeat",
            Box::new(|ctx| {
                Box::pin(async move {
                    loop {
                        tokio::select! {
                            _ = ctx.cancelled() => {
                                tracing::info!("heartbeat stopping");
                                break;
                            }
                            _ = tokio::time::sleep(Duration::from_secs(5)) => {
                                tracing::info!("still alive");
                            }
                        }
                    }
                    Ok(())
                })
            }),
        )
        .with_closer(|| async {
            tracing::info!("flushing before exit");
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(5))
        .run()
        .await
}
