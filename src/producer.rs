//! Order submission: the gated synchronous path and the queued path.

use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::broker::{Broker, BrokerError, MessageEnvelope};
use crate::gate::SubmissionGate;
use crate::order::{Order, OrderRequest, OrderStatus, ValidationError};
use crate::payment::PaymentProcessor;

/// Value of [`MessageEnvelope::source`] on published orders
pub const ENVELOPE_SOURCE: &str = "order-api";

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("invalid order: {0}")]
    Validation(#[from] ValidationError),
    #[error("failed to serialize order: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to queue order: {0}")]
    Publish(#[source] BrokerError),
}

/// Result of a queued submission
#[derive(Debug, Clone)]
pub struct Accepted {
    /// The order as published, still `pending`
    pub order: Order,
    pub message_id: Uuid,
}

pub struct OrderService {
    gate: SubmissionGate,
    payments: Arc<dyn PaymentProcessor>,
    broker: Arc<dyn Broker>,
    topic: String,
}

impl OrderService {
    pub fn new(
        payments: Arc<dyn PaymentProcessor>,
        broker: Arc<dyn Broker>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            gate: SubmissionGate::new(),
            payments,
            broker,
            topic: topic.into(),
        }
    }

    /// Process an order inline, one payment at a time across all callers.
    ///
    /// Latency is the wait for the gate plus one payment, so under load the
    /// whole service completes at most one synchronous order per payment
    /// latency.
    pub async fn submit_sync(&self, request: OrderRequest) -> Result<Order, SubmitError> {
        let request = request.validate()?;
        let mut order = Order::from_request(request, OrderStatus::Processing);

        tracing::info!(order_id = %order.order_id, "Processing sync order");
        self.gate.run(self.payments.process(&order)).await;

        order.status = OrderStatus::Completed;
        tracing::info!(order_id = %order.order_id, "Completed sync order");
        Ok(order)
    }

    /// Queue an order for the worker pool and return immediately.
    ///
    /// Once the broker has accepted the message this service keeps nothing
    /// about the order.
    pub async fn submit_async(&self, request: OrderRequest) -> Result<Accepted, SubmitError> {
        let request = request.validate()?;
        let order = Order::from_request(request, OrderStatus::Pending);

        let envelope = MessageEnvelope::wrap(&order)
            .map_err(SubmitError::Serialize)?
            .with_source(ENVELOPE_SOURCE);
        let payload = envelope.to_bytes().map_err(SubmitError::Serialize)?;

        self.broker.publish(&self.topic, payload).await.map_err(|e| {
            tracing::error!(order_id = %order.order_id, error = %e, "Failed to publish order");
            SubmitError::Publish(e)
        })?;

        tracing::info!(
            order_id = %order.order_id,
            message_id = %envelope.message_id,
            "Accepted async order"
        );

        Ok(Accepted {
            order,
            message_id: envelope.message_id,
        })
    }

    pub fn gate(&self) -> &SubmissionGate {
        &self.gate
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;
    use crate::consumer::parse_delivery;
    use crate::broker::{Delivery, ReceiveOptions};
    use crate::order::LineItem;
    use crate::payment::SimulatedPayment;
    use std::time::Duration;

    fn service(broker: Arc<InMemoryBroker>) -> OrderService {
        OrderService::new(
            Arc::new(SimulatedPayment::fixed(Duration::from_millis(5))),
            broker,
            "orders",
        )
    }

    fn request() -> OrderRequest {
        OrderRequest {
            customer_id: 1,
            items: vec![LineItem {
                product_id: "p1".to_string(),
                quantity: 2,
                price: 9.99,
            }],
        }
    }

    #[tokio::test]
    async fn test_sync_submission_completes_order() {
        let svc = service(Arc::new(InMemoryBroker::new()));
        let order = svc.submit_sync(request()).await.unwrap();

        assert_eq!(order.status, OrderStatus::Completed);
        assert!(!svc.gate().is_held());
    }

    #[tokio::test]
    async fn test_async_submission_publishes_pending_order() {
        let broker = Arc::new(InMemoryBroker::new());
        let svc = service(broker.clone());

        let accepted = svc.submit_async(request()).await.unwrap();
        assert_eq!(accepted.order.status, OrderStatus::Pending);
        assert_eq!(broker.depth("orders"), 1);

        let batch: Vec<Delivery> = broker
            .receive("orders", &ReceiveOptions::default())
            .await
            .unwrap();
        let (envelope, order) = parse_delivery(&batch[0]).unwrap();
        assert_eq!(envelope.message_id, accepted.message_id);
        assert_eq!(envelope.source.as_deref(), Some(ENVELOPE_SOURCE));
        assert_eq!(order, accepted.order);
    }

    #[tokio::test]
    async fn test_invalid_order_has_no_side_effects() {
        let broker = Arc::new(InMemoryBroker::new());
        let svc = service(broker.clone());

        let mut bad = request();
        bad.items[0].quantity = 0;

        assert!(matches!(
            svc.submit_async(bad.clone()).await,
            Err(SubmitError::Validation(_))
        ));
        assert!(matches!(
            svc.submit_sync(bad).await,
            Err(SubmitError::Validation(_))
        ));
        assert_eq!(broker.depth("orders"), 0);
    }
}
