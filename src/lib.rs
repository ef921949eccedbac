//! # order-relay: order intake in front of a slow payment gateway
//!
//! Two ways to get an order paid for:
//!
//! - **Synchronous**: the request waits while the order goes through a
//!   single-slot [`SubmissionGate`], so payments run strictly one at a time
//!   no matter how many callers are waiting.
//! - **Asynchronous**: the order is wrapped in a [`MessageEnvelope`] and
//!   published to a broker; a [`WorkerPool`] long-polls the queue and pays
//!   for up to `workers` orders at once, acknowledging each message only
//!   after its payment ran (at-least-once).
//!
//! ## Example: in-process pipeline
//!
//! ```ignore
//! use order_relay::{ConsumerConfig, InMemoryBroker, OrderService, ShutdownCoordinator,
//!                   SimulatedPayment, WorkerPool};
//! use std::sync::Arc;
//!
//! let broker = Arc::new(InMemoryBroker::new());
//! let payments = Arc::new(SimulatedPayment::default());
//! let orders = OrderService::new(payments.clone(), broker.clone(), "orders");
//!
//! let pool = WorkerPool::new(broker, payments, "orders", ConsumerConfig::default().with_workers(4))?;
//! let shutdown = ShutdownCoordinator::new();
//! tokio::spawn(pool.run(shutdown.token()));
//!
//! orders.submit_async(request).await?;
//! ```

// Domain
pub mod order;
pub mod payment;

// Synchronous path
pub mod gate;
pub mod producer;

// Broker adapters and the queue consumer
pub mod broker;
pub mod consumer;

// Process plumbing
pub mod api;
pub mod shutdown;
pub mod telemetry;

// Re-export key types
pub use order::{LineItem, Order, OrderRequest, OrderStatus, ValidationError};
pub use payment::{Latency, PaymentProcessor, SimulatedPayment};
pub use gate::{GateGuard, SubmissionGate};
pub use producer::{Accepted, OrderService, SubmitError};

pub use broker::{
    Broker, BrokerError, Delivery, InMemoryBroker, MessageEnvelope, NatsBroker, NatsConfig,
    ReceiveOptions,
};
pub use consumer::{ConsumerConfig, ConsumerState, StatsSnapshot, WorkerPool};
pub use shutdown::ShutdownCoordinator;
