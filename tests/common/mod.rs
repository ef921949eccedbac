//! Shared helpers for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use order_relay::{
    Broker, BrokerError, ConsumerConfig, Delivery, InMemoryBroker, LineItem, MessageEnvelope,
    Order, OrderRequest, OrderStatus, PaymentProcessor, ReceiveOptions,
};

pub const QUEUE: &str = "orders";

/// Payment stub that records how many calls overlap
pub struct CountingPayment {
    latency: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
    orders: Mutex<Vec<String>>,
}

impl CountingPayment {
    pub fn new(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            orders: Mutex::new(Vec::new()),
        })
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Order ids in the order their payments finished
    pub fn orders(&self) -> Vec<String> {
        self.orders.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentProcessor for CountingPayment {
    async fn process(&self, order: &Order) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.latency).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.orders.lock().unwrap().push(order.order_id.clone());
    }
}

/// Delegates to an [`InMemoryBroker`] but fails the first `n` deletes
pub struct FailingDeletes {
    pub inner: Arc<InMemoryBroker>,
    remaining: AtomicU32,
}

impl FailingDeletes {
    pub fn new(inner: Arc<InMemoryBroker>, failures: u32) -> Arc<Self> {
        Arc::new(Self {
            inner,
            remaining: AtomicU32::new(failures),
        })
    }
}

#[async_trait]
impl Broker for FailingDeletes {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        self.inner.publish(topic, payload).await
    }

    async fn receive(
        &self,
        queue: &str,
        options: &ReceiveOptions,
    ) -> Result<Vec<Delivery>, BrokerError> {
        self.inner.receive(queue, options).await
    }

    async fn delete(&self, queue: &str, receipt_handle: &str) -> Result<(), BrokerError> {
        let failed = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(BrokerError::Delete("injected delete failure".to_string()));
        }
        self.inner.delete(queue, receipt_handle).await
    }
}

/// Broker that is down: every call fails and readiness reports disconnected
pub struct UnavailableBroker;

#[async_trait]
impl Broker for UnavailableBroker {
    async fn publish(&self, _topic: &str, _payload: Vec<u8>) -> Result<(), BrokerError> {
        Err(BrokerError::Publish("connection refused".to_string()))
    }

    async fn receive(
        &self,
        _queue: &str,
        _options: &ReceiveOptions,
    ) -> Result<Vec<Delivery>, BrokerError> {
        Err(BrokerError::Receive("connection refused".to_string()))
    }

    async fn delete(&self, _queue: &str, _receipt_handle: &str) -> Result<(), BrokerError> {
        Err(BrokerError::Delete("connection refused".to_string()))
    }

    fn is_connected(&self) -> bool {
        false
    }
}

pub fn sample_request() -> OrderRequest {
    OrderRequest {
        customer_id: 1,
        items: vec![LineItem {
            product_id: "p1".to_string(),
            quantity: 2,
            price: 9.99,
        }],
    }
}

pub fn sample_body() -> &'static str {
    r#"{"customer_id":1,"items":[{"product_id":"p1","quantity":2,"price":9.99}]}"#
}

/// Serialized envelope around a fresh pending order
pub fn envelope_bytes() -> Vec<u8> {
    let order = Order::from_request(sample_request(), OrderStatus::Pending);
    MessageEnvelope::wrap(&order).unwrap().to_bytes().unwrap()
}

pub async fn publish_orders(broker: &InMemoryBroker, count: usize) {
    for _ in 0..count {
        broker.publish(QUEUE, envelope_bytes()).await.unwrap();
    }
}

/// Short timings so the suite runs in well under a second per test
pub fn fast_config(workers: usize) -> ConsumerConfig {
    ConsumerConfig {
        workers,
        batch_size: 10,
        wait_time: Duration::from_millis(50),
        visibility_timeout: Duration::from_secs(5),
        channel_capacity: 100,
        poll_error_backoff: Duration::from_millis(100),
        drain_timeout: Duration::from_secs(5),
    }
}

/// Poll `condition` every few milliseconds until it holds or `timeout` passes
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Await `fut` or panic after `timeout`
pub async fn within<T>(timeout: Duration, fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(timeout, fut)
        .await
        .expect("operation did not finish in time")
}
