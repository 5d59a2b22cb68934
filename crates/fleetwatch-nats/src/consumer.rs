use anyhow::{Context, Result};
use async_nats::jetstream::{self, Message};
use bytes::Bytes;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::DEAD_LETTER_STREAM;
use crate::traits::{JetStreamConsumer, JetStreamPublisher, PullConsumer};

/// Redelivery and parallelism policy for a consumer group.
#[derive(Debug, Clone)]
pub struct ConsumerPolicy {
    /// Messages fetched per batch
    pub batch_size: usize,
    /// Max wait for a batch to fill
    pub max_wait: Duration,
    /// Parallel partition lanes. Ordering is only guaranteed per partition
    /// key, so this trades throughput for ordering granularity.
    pub concurrency: usize,
    /// Delivery attempts before an event is routed to the dead-letter stream
    pub max_deliveries: i64,
}

impl Default for ConsumerPolicy {
    fn default() -> Self {
        Self {
            batch_size: 30,
            max_wait: Duration::from_secs(5),
            concurrency: 3,
            max_deliveries: 5,
        }
    }
}

/// An owned view of one delivered message, handed to the event handler.
#[derive(Debug, Clone)]
pub struct EventDelivery {
    pub subject: String,
    pub partition_key: String,
    pub payload: Bytes,
    /// 1-based delivery attempt reported by the stream
    pub delivered: i64,
}

/// Handler invoked once per message. `Ok` acknowledges, `Err` rejects for
/// redelivery.
pub type EventHandler = Arc<dyn Fn(EventDelivery) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// The partition key is the subject's last token (`{stream}.{key}`).
pub fn partition_key_of(subject: &str) -> String {
    subject.rsplit('.').next().unwrap_or(subject).to_string()
}

/// JetStream pull consumer that preserves per-partition-key ordering while
/// processing distinct keys concurrently.
///
/// Each fetched batch is grouped by partition key; groups run on up to
/// `concurrency` lanes, and inside a group messages run strictly
/// sequentially. When a message fails, the rest of its group is rejected
/// unprocessed so redelivery cannot reorder the key's events. A message
/// whose delivery count exceeds the policy bound is published to the
/// dead-letter stream and acknowledged instead of blocking the partition.
pub struct PartitionedConsumer {
    consumer: Box<dyn PullConsumer>,
    publisher: Arc<dyn JetStreamPublisher>,
    stream_name: String,
    consumer_name: String,
    policy: ConsumerPolicy,
    handler: EventHandler,
}

impl PartitionedConsumer {
    pub async fn new(
        jetstream: Arc<dyn JetStreamConsumer>,
        publisher: Arc<dyn JetStreamPublisher>,
        stream_name: &str,
        consumer_name: &str,
        subject_filter: &str,
        policy: ConsumerPolicy,
        handler: EventHandler,
    ) -> Result<Self> {
        debug!(
            stream = %stream_name,
            consumer = %consumer_name,
            filter_subject = %subject_filter,
            "creating partitioned consumer"
        );

        let config = jetstream::consumer::pull::Config {
            name: Some(consumer_name.to_string()),
            durable_name: Some(consumer_name.to_string()),
            filter_subject: subject_filter.to_string(),
            ack_policy: jetstream::consumer::AckPolicy::Explicit,
            ..Default::default()
        };

        let consumer = jetstream
            .create_consumer(config, stream_name)
            .await
            .context("failed to create consumer")?;

        info!(
            stream = %stream_name,
            consumer = %consumer_name,
            "partitioned consumer created"
        );

        Ok(Self {
            consumer,
            publisher,
            stream_name: stream_name.to_string(),
            consumer_name: consumer_name.to_string(),
            policy,
            handler,
        })
    }

    /// Run the consumer loop until cancellation.
    pub async fn run(&self, ctx: CancellationToken) -> Result<()> {
        info!(
            stream = %self.stream_name,
            consumer = %self.consumer_name,
            lanes = self.policy.concurrency,
            "starting consumer loop"
        );

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    info!(
                        stream = %self.stream_name,
                        consumer = %self.consumer_name,
                        "received shutdown signal, stopping consumer"
                    );
                    break;
                }
                result = self.fetch_and_process_batch() => {
                    if let Err(e) = result {
                        error!(
                            stream = %self.stream_name,
                            consumer = %self.consumer_name,
                            error = %e,
                            "error processing batch"
                        );
                        // Continue processing despite errors
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }

        info!(
            stream = %self.stream_name,
            consumer = %self.consumer_name,
            "consumer stopped gracefully"
        );
        Ok(())
    }

    async fn fetch_and_process_batch(&self) -> Result<()> {
        let messages = self
            .consumer
            .fetch_messages(self.policy.batch_size, self.policy.max_wait)
            .await?;

        if messages.is_empty() {
            debug!("no messages in batch");
            return Ok(());
        }

        debug!(message_count = messages.len(), "received message batch");

        // Group by partition key, preserving fetch order within each key
        let mut groups: HashMap<String, Vec<Message>> = HashMap::new();
        for msg in messages {
            let key = partition_key_of(&msg.subject);
            groups.entry(key).or_default().push(msg);
        }

        let semaphore = Arc::new(Semaphore::new(self.policy.concurrency.max(1)));
        let mut lanes = JoinSet::new();

        for (key, group) in groups {
            let semaphore = Arc::clone(&semaphore);
            let handler = Arc::clone(&self.handler);
            let publisher = Arc::clone(&self.publisher);
            let stream_name = self.stream_name.clone();
            let max_deliveries = self.policy.max_deliveries;

            lanes.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                process_partition_group(
                    &key,
                    group,
                    handler,
                    publisher,
                    &stream_name,
                    max_deliveries,
                )
                .await;
            });
        }

        while let Some(result) = lanes.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "partition lane panicked");
            }
        }

        Ok(())
    }
}

/// Process one key's messages strictly in order. On a handler failure the
/// failing message and everything after it in the group are rejected so the
/// stream redelivers them in order.
async fn process_partition_group(
    key: &str,
    group: Vec<Message>,
    handler: EventHandler,
    publisher: Arc<dyn JetStreamPublisher>,
    stream_name: &str,
    max_deliveries: i64,
) {
    let mut failed = false;

    for msg in group {
        if failed {
            nak(&msg).await;
            continue;
        }

        let delivered = msg.info().map(|i| i.delivered).unwrap_or(1);

        if delivered > max_deliveries {
            dead_letter(&msg, key, stream_name, &publisher).await;
            continue;
        }

        let delivery = EventDelivery {
            subject: msg.subject.to_string(),
            partition_key: key.to_string(),
            payload: Bytes::copy_from_slice(&msg.payload),
            delivered,
        };

        match handler(delivery).await {
            Ok(()) => {
                if let Err(e) = msg.ack().await {
                    error!(subject = %msg.subject, error = %e, "failed to acknowledge message");
                }
            }
            Err(e) => {
                warn!(
                    subject = %msg.subject,
                    partition_key = %key,
                    delivered,
                    error = %e,
                    "handler failed, rejecting message and the rest of its partition batch"
                );
                nak(&msg).await;
                failed = true;
            }
        }
    }
}

async fn nak(msg: &Message) {
    if let Err(e) = msg.ack_with(jetstream::AckKind::Nak(None)).await {
        error!(subject = %msg.subject, error = %e, "failed to reject message");
    }
}

async fn dead_letter(
    msg: &Message,
    key: &str,
    stream_name: &str,
    publisher: &Arc<dyn JetStreamPublisher>,
) {
    let subject = format!("{DEAD_LETTER_STREAM}.{stream_name}.{key}");
    warn!(
        subject = %msg.subject,
        dead_letter_subject = %subject,
        "delivery budget exhausted, routing event to dead-letter stream"
    );

    match publisher
        .publish(subject, Bytes::copy_from_slice(&msg.payload))
        .await
    {
        Ok(()) => {
            if let Err(e) = msg.ack().await {
                error!(subject = %msg.subject, error = %e, "failed to acknowledge dead-lettered message");
            }
        }
        Err(e) => {
            // Keep the event on the stream rather than losing it
            error!(subject = %msg.subject, error = %e, "failed to publish to dead-letter stream");
            nak(msg).await;
        }
    }
}
