//! A single pool worker: unwrap, pay, acknowledge.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use super::stats::ConsumerStats;
use crate::broker::{Broker, Delivery, MessageEnvelope};
use crate::order::{Order, OrderStatus};
use crate::payment::PaymentProcessor;

/// Receiving half of the work channel, shared by all workers
pub(crate) type SharedJobs = Arc<Mutex<mpsc::Receiver<Delivery>>>;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("invalid envelope: {0}")]
    Envelope(serde_json::Error),
    #[error("invalid order payload: {0}")]
    Payload(serde_json::Error),
}

/// Unwrap a delivery into the order it carries.
pub fn parse_delivery(delivery: &Delivery) -> Result<(MessageEnvelope, Order), ProcessError> {
    let envelope = MessageEnvelope::from_slice(&delivery.body).map_err(ProcessError::Envelope)?;
    let order = envelope.order().map_err(ProcessError::Payload)?;
    Ok((envelope, order))
}

pub(crate) struct Worker {
    pub id: usize,
    pub queue: String,
    pub broker: Arc<dyn Broker>,
    pub payments: Arc<dyn PaymentProcessor>,
    pub stats: Arc<ConsumerStats>,
    pub jobs: SharedJobs,
    pub shutdown: CancellationToken,
}

impl Worker {
    /// Take deliveries until the channel closes or shutdown is requested.
    ///
    /// Shutdown is only observed between messages: a message that has been
    /// taken is always processed and acknowledged. A panic while handling a
    /// message is contained here, so the worker keeps serving the channel and
    /// the message goes back to the broker unacknowledged.
    pub async fn run(self) {
        tracing::debug!(worker_id = self.id, "Worker started");

        loop {
            let next = {
                let mut jobs = self.jobs.lock().await;
                tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => None,
                    delivery = jobs.recv() => delivery,
                }
            };

            let Some(delivery) = next else {
                break;
            };

            let attempt = delivery.attempt;
            if AssertUnwindSafe(self.handle(delivery)).catch_unwind().await.is_err() {
                self.stats.record_panic();
                tracing::error!(
                    worker_id = self.id,
                    attempt,
                    "Worker panicked while handling a message, leaving it for redelivery"
                );
            }
        }

        tracing::debug!(worker_id = self.id, "Worker stopped");
    }

    async fn handle(&self, delivery: Delivery) {
        let (envelope, mut order) = match parse_delivery(&delivery) {
            Ok(parsed) => parsed,
            Err(e) => {
                // Left unacknowledged: the broker redelivers it once the
                // visibility timeout runs out.
                self.stats.record_parse_failure();
                tracing::warn!(
                    worker_id = self.id,
                    attempt = delivery.attempt,
                    error = %e,
                    "Failed to parse message, leaving it for redelivery"
                );
                return;
            }
        };

        order.status = OrderStatus::Processing;
        tracing::info!(
            worker_id = self.id,
            order_id = %order.order_id,
            customer_id = order.customer_id,
            total = order.total(),
            message_id = %envelope.message_id,
            attempt = delivery.attempt,
            "Processing order"
        );

        self.payments.process(&order).await;
        order.status = OrderStatus::Completed;
        self.stats.record_processed();

        tracing::info!(
            worker_id = self.id,
            order_id = %order.order_id,
            status = %order.status,
            "Completed order"
        );

        match self.broker.delete(&self.queue, &delivery.receipt_handle).await {
            Ok(()) => self.stats.record_ack(true),
            Err(e) => {
                self.stats.record_ack(false);
                tracing::error!(
                    worker_id = self.id,
                    order_id = %order.order_id,
                    error = %e,
                    "Failed to delete message, order may be processed again"
                );
            }
        }
    }
}
