//! Order model shared by the submission paths and the queue workers.
//!
//! Orders are never stored. An order lives in the HTTP request that created
//! it (synchronous path) or inside a queued message (asynchronous path).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Processing status of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Queued on the broker, not yet picked up by a worker
    Pending,
    /// Owned by a submission or a worker, payment in progress
    Processing,
    Completed,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "pending"),
            OrderStatus::Processing => write!(f, "processing"),
            OrderStatus::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: String,
    pub quantity: i64,
    pub price: f64,
}

/// A submitted order as it travels over HTTP and through the broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub customer_id: i64,
    pub status: OrderStatus,
    pub items: Vec<LineItem>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Build a fresh order from a validated request.
    ///
    /// Identity and creation time are assigned here and nowhere else.
    pub fn from_request(request: OrderRequest, status: OrderStatus) -> Self {
        Self {
            order_id: Uuid::new_v4().to_string(),
            customer_id: request.customer_id,
            status,
            items: request.items,
            created_at: Utc::now(),
        }
    }

    pub fn total(&self) -> f64 {
        self.items
            .iter()
            .map(|item| item.price * item.quantity as f64)
            .sum()
    }
}

/// Inbound order body.
///
/// Any `order_id`, `status` or `created_at` sent by the client is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderRequest {
    pub customer_id: i64,
    #[serde(default)]
    pub items: Vec<LineItem>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("customer_id must not be negative, got {0}")]
    NegativeCustomer(i64),
    #[error("order must contain at least one item")]
    NoItems,
    #[error("item {index}: product_id is empty")]
    EmptyProduct { index: usize },
    #[error("item {index}: quantity must be at least 1, got {quantity}")]
    InvalidQuantity { index: usize, quantity: i64 },
    #[error("item {index}: price must be a non-negative number")]
    InvalidPrice { index: usize },
}

impl OrderRequest {
    /// Check the request and normalize product identifiers.
    pub fn validate(mut self) -> Result<Self, ValidationError> {
        if self.customer_id < 0 {
            return Err(ValidationError::NegativeCustomer(self.customer_id));
        }
        if self.items.is_empty() {
            return Err(ValidationError::NoItems);
        }

        for (index, item) in self.items.iter_mut().enumerate() {
            let trimmed = item.product_id.trim();
            if trimmed.is_empty() {
                return Err(ValidationError::EmptyProduct { index });
            }
            if trimmed.len() != item.product_id.len() {
                item.product_id = trimmed.to_string();
            }
            if item.quantity < 1 {
                return Err(ValidationError::InvalidQuantity {
                    index,
                    quantity: item.quantity,
                });
            }
            if !item.price.is_finite() || item.price < 0.0 {
                return Err(ValidationError::InvalidPrice { index });
            }
        }

        Ok(self)
    }
}
