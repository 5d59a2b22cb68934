use anyhow::{Context, Result};
use async_nats::jetstream::{self, stream::Config as StreamConfig};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::traits::{JetStreamConsumer, JetStreamPublisher, PullConsumer};

/// Name of the stream that receives events exhausted by redelivery.
pub const DEAD_LETTER_STREAM: &str = "deadletter";

/// Connection handle to NATS with JetStream enabled.
pub struct NatsClient {
    jetstream: jetstream::Context,
}

impl NatsClient {
    pub async fn connect(url: &str, timeout: std::time::Duration) -> Result<Self> {
        info!(url = %url, ?timeout, "connecting to NATS");

        let client = async_nats::ConnectOptions::new()
            .connection_timeout(timeout)
            .connect(url)
            .await
            .context("failed to connect to NATS")?;

        let jetstream = jetstream::new(client);

        info!("connected to NATS");
        Ok(Self { jetstream })
    }

    /// Create the stream if it does not exist. Subjects follow the
    /// `{stream}.{partition_key}` scheme.
    pub async fn ensure_stream(&self, stream_name: &str, description: &str) -> Result<()> {
        let config = StreamConfig {
            name: stream_name.to_string(),
            subjects: vec![format!("{stream_name}.>")],
            description: Some(description.to_string()),
            ..Default::default()
        };

        match self.jetstream.get_stream(stream_name).await {
            Ok(_) => {
                info!(stream = %stream_name, "stream already exists");
            }
            Err(_) => {
                self.jetstream
                    .create_stream(config)
                    .await
                    .with_context(|| format!("failed to create stream {stream_name}"))?;
                info!(stream = %stream_name, "created stream");
            }
        }

        Ok(())
    }

    /// Create the dead-letter stream alongside the event streams.
    pub async fn ensure_dead_letter_stream(&self) -> Result<()> {
        self.ensure_stream(DEAD_LETTER_STREAM, "Events exhausted by redelivery")
            .await
    }

    pub fn create_publisher_client(&self) -> Arc<dyn JetStreamPublisher> {
        Arc::new(JetStreamContext {
            jetstream: self.jetstream.clone(),
        })
    }

    pub fn create_consumer_client(&self) -> Arc<dyn JetStreamConsumer> {
        Arc::new(JetStreamContext {
            jetstream: self.jetstream.clone(),
        })
    }
}

/// Concrete publisher/consumer backed by a JetStream context.
struct JetStreamContext {
    jetstream: jetstream::Context,
}

#[async_trait]
impl JetStreamPublisher for JetStreamContext {
    async fn publish(&self, subject: String, payload: bytes::Bytes) -> Result<()> {
        self.jetstream
            .publish(subject, payload)
            .await
            .context("failed to publish message")?
            .await
            .context("publish was not acknowledged by the stream")?;
        Ok(())
    }
}

#[async_trait]
impl JetStreamConsumer for JetStreamContext {
    async fn create_consumer(
        &self,
        config: jetstream::consumer::pull::Config,
        stream_name: &str,
    ) -> Result<Box<dyn PullConsumer>> {
        let consumer = self
            .jetstream
            .create_consumer_on_stream(config, stream_name)
            .await
            .context("failed to create consumer")?;
        Ok(Box::new(JetStreamPullConsumer { consumer }))
    }
}

struct JetStreamPullConsumer {
    consumer: jetstream::consumer::PullConsumer,
}

#[async_trait]
impl PullConsumer for JetStreamPullConsumer {
    async fn fetch_messages(
        &self,
        max_messages: usize,
        expires: std::time::Duration,
    ) -> Result<Vec<jetstream::Message>> {
        use futures::StreamExt;

        let mut batch = self
            .consumer
            .fetch()
            .max_messages(max_messages)
            .expires(expires)
            .messages()
            .await
            .context("failed to fetch messages")?;

        let mut messages = Vec::new();
        while let Some(result) = batch.next().await {
            match result {
                Ok(msg) => messages.push(msg),
                Err(e) => tracing::warn!(error = %e, "error receiving message from batch"),
            }
        }
        Ok(messages)
    }
}
