//! Message broker integration
//!
//! The broker is consumed as an opaque queue through the [`Broker`] trait.
//! Two adapters are provided: NATS JetStream for deployments and an in-memory
//! queue with visibility timeouts for local runs and tests.

pub mod memory;
pub mod message_envelope;
pub mod nats;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use memory::InMemoryBroker;
pub use message_envelope::MessageEnvelope;
pub use nats::{NatsBroker, NatsConfig};

/// Options for a single long-poll receive
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiveOptions {
    /// Upper bound on deliveries returned by one call
    pub max_messages: usize,
    /// How long the call may wait for the first message
    pub wait_time: Duration,
    /// How long a received message stays hidden before it is redelivered
    pub visibility_timeout: Duration,
}

impl Default for ReceiveOptions {
    fn default() -> Self {
        Self {
            max_messages: 10,
            wait_time: Duration::from_secs(20),
            visibility_timeout: Duration::from_secs(30),
        }
    }
}

/// One delivery of a queued message.
///
/// The receipt handle identifies this delivery, not the message: a
/// redelivery of the same message carries a new handle.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub receipt_handle: String,
    /// 1 for the first delivery, incremented on each redelivery
    pub attempt: u32,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker connection failed: {0}")]
    Connect(String),
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("receive failed: {0}")]
    Receive(String),
    #[error("delete failed: {0}")]
    Delete(String),
    #[error("receipt handle {receipt_handle} is not current for queue {queue}")]
    UnknownReceipt {
        queue: String,
        receipt_handle: String,
    },
}

#[async_trait]
pub trait Broker: Send + Sync {
    /// Publish a payload to a topic; returns once the broker has accepted it.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError>;

    /// Long-poll a queue. An empty result means the wait time elapsed.
    async fn receive(
        &self,
        queue: &str,
        options: &ReceiveOptions,
    ) -> Result<Vec<Delivery>, BrokerError>;

    /// Acknowledge a delivery so it is never redelivered.
    async fn delete(&self, queue: &str, receipt_handle: &str) -> Result<(), BrokerError>;

    fn is_connected(&self) -> bool {
        true
    }
}
