//! NATS JetStream adapter for the order queue
//!
//! Topics map to JetStream subjects and queues map to durable pull consumers.
//! A delivery's receipt handle is its JetStream reply subject; deleting a
//! delivery publishes an explicit ack to that subject.

use async_nats::jetstream::{self, consumer::PullConsumer};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::fmt::Display;
use std::time::Duration;
use tokio::sync::Mutex;

use super::{Broker, BrokerError, Delivery, ReceiveOptions};

#[derive(Debug, Clone)]
pub struct NatsConfig {
    pub url: String,
    pub stream_name: String,
    /// Subject order envelopes are published on
    pub order_subject: String,
    pub max_age: Duration,
    pub max_bytes: i64,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("NATS_URL")
                .unwrap_or_else(|_| "nats://localhost:4222".to_string()),
            stream_name: std::env::var("NATS_STREAM")
                .unwrap_or_else(|_| "ORDERS".to_string()),
            order_subject: std::env::var("ORDER_SUBJECT")
                .unwrap_or_else(|_| "orders.submitted".to_string()),
            max_age: Duration::from_secs(24 * 60 * 60), // 24 hours
            max_bytes: 1024 * 1024 * 1024, // 1GB
        }
    }
}

pub struct NatsBroker {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    stream: jetstream::stream::Stream,
    config: NatsConfig,
    consumers: Mutex<HashMap<String, PullConsumer>>,
}

impl NatsBroker {
    /// Connect to NATS and make sure the order stream exists
    pub async fn connect(config: NatsConfig) -> Result<Self, BrokerError> {
        let client = async_nats::connect(&config.url)
            .await
            .map_err(|e| BrokerError::Connect(format!("{}: {}", config.url, e)))?;
        tracing::info!("Connected to NATS at {}", config.url);

        let jetstream = jetstream::new(client.clone());

        let stream = jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: config.stream_name.clone(),
                subjects: vec![config.order_subject.clone()],
                max_age: config.max_age,
                max_bytes: config.max_bytes,
                storage: jetstream::stream::StorageType::File,
                num_replicas: 1,
                ..Default::default()
            })
            .await
            .map_err(|e| BrokerError::Connect(format!("stream '{}': {}", config.stream_name, e)))?;

        tracing::info!("JetStream stream '{}' ready", config.stream_name);

        Ok(Self {
            client,
            jetstream,
            stream,
            config,
            consumers: Mutex::new(HashMap::new()),
        })
    }

    /// Durable pull consumer backing `queue`.
    ///
    /// JetStream fixes the redelivery window per consumer, so the visibility
    /// timeout of the first receive on a queue becomes the consumer's
    /// `ack_wait`. An existing durable consumer keeps its stored settings.
    async fn consumer(
        &self,
        queue: &str,
        options: &ReceiveOptions,
    ) -> Result<PullConsumer, BrokerError> {
        let mut consumers = self.consumers.lock().await;
        if let Some(consumer) = consumers.get(queue) {
            return Ok(consumer.clone());
        }

        let consumer = self
            .stream
            .get_or_create_consumer(
                queue,
                jetstream::consumer::pull::Config {
                    durable_name: Some(queue.to_string()),
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    ack_wait: options.visibility_timeout,
                    filter_subject: self.config.order_subject.clone(),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| BrokerError::Receive(format!("consumer '{}': {}", queue, e)))?;

        tracing::info!(
            queue,
            ack_wait_secs = options.visibility_timeout.as_secs(),
            "JetStream consumer ready"
        );

        consumers.insert(queue.to_string(), consumer.clone());
        Ok(consumer)
    }

    pub fn config(&self) -> &NatsConfig {
        &self.config
    }
}

#[async_trait]
impl Broker for NatsBroker {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        // Publish with JetStream (durable, acknowledged)
        let ack = self
            .jetstream
            .publish(topic.to_string(), payload.into())
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))?;

        ack.await.map_err(|e| BrokerError::Publish(e.to_string()))?;

        tracing::debug!("Published message to JetStream subject {}", topic);
        Ok(())
    }

    async fn receive(
        &self,
        queue: &str,
        options: &ReceiveOptions,
    ) -> Result<Vec<Delivery>, BrokerError> {
        let consumer = self.consumer(queue, options).await?;
        let limit = options.max_messages.max(1);

        // Long poll for the first message only, so a lone order is handed
        // out as soon as it arrives.
        let first = consumer
            .batch()
            .max_messages(1)
            .expires(options.wait_time)
            .messages()
            .await
            .map_err(|e| BrokerError::Receive(e.to_string()))?;
        let mut messages = take_ready(first, 1)
            .await
            .map_err(|e| BrokerError::Receive(e.to_string()))?;

        if !messages.is_empty() && limit > 1 {
            // No-wait fetch: returns whatever is already pending.
            let rest = match consumer.fetch().max_messages(limit - 1).messages().await {
                Ok(rest) => take_ready(rest, limit - 1).await.map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            match rest {
                Ok(rest) => messages.extend(rest),
                Err(e) => tracing::warn!("Fetching the rest of the batch failed: {}", e),
            }
        }

        Ok(messages.into_iter().filter_map(into_delivery).collect())
    }

    async fn delete(&self, _queue: &str, receipt_handle: &str) -> Result<(), BrokerError> {
        self.client
            .publish(receipt_handle.to_string(), "+ACK".into())
            .await
            .map_err(|e| BrokerError::Delete(e.to_string()))?;
        self.client
            .flush()
            .await
            .map_err(|e| BrokerError::Delete(e.to_string()))
    }

    fn is_connected(&self) -> bool {
        self.client.connection_state() == async_nats::connection::State::Connected
    }
}

/// Take up to `limit` messages from a pull stream without waiting for it to end.
///
/// An error before the first message fails the call. A later error keeps
/// what was taken; the rest is redelivered after `ack_wait`.
async fn take_ready<S, T, E>(stream: S, limit: usize) -> Result<Vec<T>, E>
where
    S: Stream<Item = Result<T, E>>,
    E: Display,
{
    let mut stream = std::pin::pin!(stream.take(limit));
    let mut taken = Vec::new();

    while let Some(item) = stream.next().await {
        match item {
            Ok(message) => taken.push(message),
            Err(e) if taken.is_empty() => return Err(e),
            Err(e) => {
                tracing::warn!("Batch interrupted after {} messages: {}", taken.len(), e);
                break;
            }
        }
    }

    Ok(taken)
}

fn into_delivery(msg: jetstream::Message) -> Option<Delivery> {
    let attempt = msg
        .info()
        .map(|info| info.delivered.max(1) as u32)
        .unwrap_or(1);

    let Some(reply) = msg.reply.as_ref() else {
        tracing::warn!("JetStream message without reply subject, cannot be acknowledged");
        return None;
    };

    Some(Delivery {
        receipt_handle: reply.to_string(),
        attempt,
        body: msg.payload.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn test_take_ready_returns_once_limit_is_reached() {
        // The server keeps a pull request open until it expires; the first
        // message must be handed out without waiting for that.
        let open_request = stream::iter(vec![Ok::<_, String>(1)]).chain(stream::pending());

        let taken = tokio::time::timeout(Duration::from_millis(500), take_ready(open_request, 1))
            .await
            .expect("should not wait for the request to expire")
            .unwrap();
        assert_eq!(taken, vec![1]);
    }

    #[tokio::test]
    async fn test_take_ready_stops_at_end_of_stream() {
        let ready = stream::iter(vec![Ok::<_, String>(1), Ok(2)]);
        assert_eq!(take_ready(ready, 9).await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_take_ready_error_handling() {
        let failing = stream::iter(vec![Err::<u8, _>("gone".to_string())]);
        assert_eq!(take_ready(failing, 5).await, Err("gone".to_string()));

        let interrupted = stream::iter(vec![Ok(1), Err("gone".to_string()), Ok(3)]);
        assert_eq!(take_ready(interrupted, 5).await, Ok(vec![1]));
    }
}
