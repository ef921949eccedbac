//! Message envelope carried through the broker
//!
//! Wraps a serialized order with publish metadata. Delivery metadata
//! (receipt handle, attempt) is added by the broker on receive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::order::Order;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Unique message ID for tracking
    pub message_id: Uuid,

    /// Serialized order (JSON)
    pub body: String,

    /// Timestamp when the message was published
    pub published_at: DateTime<Utc>,

    /// Publishing service
    #[serde(default)]
    pub source: Option<String>,
}

impl MessageEnvelope {
    /// Create a new message envelope around an already serialized payload
    pub fn new(body: String) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            body,
            published_at: Utc::now(),
            source: None,
        }
    }

    /// Serialize an order into a fresh envelope
    pub fn wrap(order: &Order) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::to_string(order)?))
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parse the outer wrapper of a delivery body
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Parse the inner order payload
    pub fn order(&self) -> Result<Order, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}
