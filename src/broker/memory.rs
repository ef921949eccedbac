//! In-process queue with SQS-style visibility timeouts.
//!
//! Used by `order-api --broker memory` and by the test suite. A received
//! message is hidden for the visibility timeout; if it is not deleted by
//! then it becomes visible again and the next receive hands it out with a
//! fresh receipt handle and a higher attempt number.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

use super::{Broker, BrokerError, Delivery, ReceiveOptions};

/// Upper bound on how long a waiting receive sleeps before re-checking
/// visibility deadlines.
const VISIBILITY_CHECK_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Default)]
pub struct InMemoryBroker {
    state: Mutex<State>,
    published: Notify,
}

#[derive(Default)]
struct State {
    /// topic -> queues subscribed to it
    routes: HashMap<String, Vec<String>>,
    queues: HashMap<String, Queue>,
    receive_calls: u64,
    failing_receives: u32,
}

#[derive(Default)]
struct Queue {
    messages: VecDeque<StoredMessage>,
    deleted: u64,
}

struct StoredMessage {
    body: Vec<u8>,
    attempts: u32,
    hidden_until: Option<Instant>,
    receipt_handle: Option<String>,
}

impl StoredMessage {
    fn is_visible(&self, now: Instant) -> bool {
        self.hidden_until.map_or(true, |until| until <= now)
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver messages published to `topic` into `queue`.
    ///
    /// A topic without routes delivers into the queue of the same name.
    pub fn route(&self, topic: impl Into<String>, queue: impl Into<String>) {
        self.state()
            .routes
            .entry(topic.into())
            .or_default()
            .push(queue.into());
    }

    /// Make the next `count` receive calls fail.
    pub fn fail_next_receives(&self, count: u32) {
        self.state().failing_receives = count;
    }

    /// Number of receive calls seen, failed ones included
    pub fn receive_calls(&self) -> u64 {
        self.state().receive_calls
    }

    /// Number of successful deletes on `queue`
    pub fn deleted(&self, queue: &str) -> u64 {
        self.state().queues.get(queue).map_or(0, |q| q.deleted)
    }

    /// Messages still on `queue`, visible or not
    pub fn depth(&self, queue: &str) -> usize {
        self.state().queues.get(queue).map_or(0, |q| q.messages.len())
    }

    /// Messages on `queue` currently hidden by a visibility timeout
    pub fn in_flight(&self, queue: &str) -> usize {
        let now = Instant::now();
        self.state()
            .queues
            .get(queue)
            .map_or(0, |q| q.messages.iter().filter(|m| !m.is_visible(now)).count())
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_visible(state: &mut State, queue: &str, options: &ReceiveOptions) -> Vec<Delivery> {
        let Some(queue) = state.queues.get_mut(queue) else {
            return Vec::new();
        };

        let now = Instant::now();
        let limit = options.max_messages.max(1);
        let mut batch = Vec::new();

        for message in queue.messages.iter_mut() {
            if batch.len() == limit {
                break;
            }
            if !message.is_visible(now) {
                continue;
            }

            let receipt_handle = Uuid::new_v4().to_string();
            message.attempts += 1;
            message.hidden_until = Some(now + options.visibility_timeout);
            message.receipt_handle = Some(receipt_handle.clone());

            batch.push(Delivery {
                receipt_handle,
                attempt: message.attempts,
                body: message.body.clone(),
            });
        }

        batch
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        {
            let mut state = self.state();
            let targets = state
                .routes
                .get(topic)
                .cloned()
                .unwrap_or_else(|| vec![topic.to_string()]);

            for queue in targets {
                state.queues.entry(queue).or_default().messages.push_back(StoredMessage {
                    body: payload.clone(),
                    attempts: 0,
                    hidden_until: None,
                    receipt_handle: None,
                });
            }
        }

        self.published.notify_waiters();
        Ok(())
    }

    async fn receive(
        &self,
        queue: &str,
        options: &ReceiveOptions,
    ) -> Result<Vec<Delivery>, BrokerError> {
        let deadline = Instant::now() + options.wait_time;

        {
            let mut state = self.state();
            state.receive_calls += 1;
            if state.failing_receives > 0 {
                state.failing_receives -= 1;
                return Err(BrokerError::Receive("injected receive failure".to_string()));
            }
        }

        loop {
            let published = self.published.notified();
            tokio::pin!(published);
            published.as_mut().enable();

            let batch = Self::take_visible(&mut self.state(), queue, options);
            if !batch.is_empty() {
                return Ok(batch);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }

            let step = (deadline - now).min(VISIBILITY_CHECK_INTERVAL);
            let _ = tokio::time::timeout(step, published).await;
        }
    }

    async fn delete(&self, queue: &str, receipt_handle: &str) -> Result<(), BrokerError> {
        let mut state = self.state();
        let unknown = || BrokerError::UnknownReceipt {
            queue: queue.to_string(),
            receipt_handle: receipt_handle.to_string(),
        };

        let queue_state = state.queues.get_mut(queue).ok_or_else(unknown)?;
        let position = queue_state
            .messages
            .iter()
            .position(|m| m.receipt_handle.as_deref() == Some(receipt_handle))
            .ok_or_else(unknown)?;

        queue_state.messages.remove(position);
        queue_state.deleted += 1;
        Ok(())
    }
}
