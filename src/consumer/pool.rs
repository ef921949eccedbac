//! Poll loop and worker supervision.

use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::config::{ConfigError, ConsumerConfig};
use super::stats::{ConsumerStats, StatsSnapshot};
use super::worker::{SharedJobs, Worker};
use super::ConsumerState;
use crate::broker::{Broker, Delivery};
use crate::payment::PaymentProcessor;

/// Long-polling consumer feeding a fixed pool of workers.
///
/// One poll loop receives batches from the broker and pushes each delivery
/// into a bounded channel. `workers` tasks pull from that channel, so at most
/// `workers` payments run at once and at most `channel_capacity` deliveries
/// wait between the two. A full channel stalls the poll loop instead of
/// dropping deliveries.
pub struct WorkerPool {
    broker: Arc<dyn Broker>,
    payments: Arc<dyn PaymentProcessor>,
    queue: String,
    config: ConsumerConfig,
    stats: Arc<ConsumerStats>,
    state: watch::Sender<ConsumerState>,
}

impl WorkerPool {
    pub fn new(
        broker: Arc<dyn Broker>,
        payments: Arc<dyn PaymentProcessor>,
        queue: impl Into<String>,
        config: ConsumerConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let (state, _) = watch::channel(ConsumerState::Polling);

        Ok(Self {
            broker,
            payments,
            queue: queue.into(),
            config,
            stats: Arc::new(ConsumerStats::default()),
            state,
        })
    }

    pub fn stats(&self) -> Arc<ConsumerStats> {
        self.stats.clone()
    }

    /// Follow the consumer's state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Consume until `shutdown` is cancelled, then drain the workers.
    pub async fn run(self, shutdown: CancellationToken) -> StatsSnapshot {
        tracing::info!(
            queue = %self.queue,
            workers = self.config.workers,
            batch_size = self.config.batch_size,
            channel_capacity = self.config.channel_capacity,
            "Starting order processor"
        );

        let (jobs_tx, jobs_rx) = mpsc::channel::<Delivery>(self.config.channel_capacity);
        let jobs: SharedJobs = Arc::new(Mutex::new(jobs_rx));

        let mut workers = JoinSet::new();
        for id in 1..=self.config.workers {
            let worker = Worker {
                id,
                queue: self.queue.clone(),
                broker: self.broker.clone(),
                payments: self.payments.clone(),
                stats: self.stats.clone(),
                jobs: jobs.clone(),
                shutdown: shutdown.clone(),
            };
            workers.spawn(worker.run());
        }
        drop(jobs);

        self.poll_loop(&jobs_tx, &shutdown).await;

        self.set_state(ConsumerState::Draining);
        drop(jobs_tx);
        self.drain(workers).await;

        self.set_state(ConsumerState::Stopped);
        let stats = self.stats.snapshot();
        tracing::info!(
            processed = stats.processed,
            acked = stats.acked,
            parse_failures = stats.parse_failures,
            poll_errors = stats.poll_errors,
            panics = stats.panics,
            "Order processor stopped"
        );
        stats
    }

    async fn poll_loop(&self, jobs: &mpsc::Sender<Delivery>, shutdown: &CancellationToken) {
        let options = self.config.receive_options();

        loop {
            self.set_state(ConsumerState::Polling);

            let received = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return,
                result = self.broker.receive(&self.queue, &options) => result,
            };

            let deliveries = match received {
                Ok(deliveries) => deliveries,
                Err(e) => {
                    self.stats.record_poll_error();
                    tracing::warn!(
                        error = %e,
                        backoff_ms = self.config.poll_error_backoff.as_millis() as u64,
                        "Error receiving messages"
                    );
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => return,
                        _ = tokio::time::sleep(self.config.poll_error_backoff) => {}
                    }
                    continue;
                }
            };

            self.stats.record_poll(deliveries.len());
            if deliveries.is_empty() {
                tracing::debug!("No messages received, continuing to poll");
                continue;
            }

            tracing::info!("Received {} messages from queue", deliveries.len());
            self.set_state(ConsumerState::Dispatching);

            let total = deliveries.len();
            for (index, delivery) in deliveries.into_iter().enumerate() {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => {
                        tracing::info!(
                            undispatched = total - index,
                            "Shutdown during dispatch, remaining messages left for redelivery"
                        );
                        return;
                    }
                    sent = jobs.send(delivery) => {
                        if sent.is_err() {
                            tracing::error!("Work channel closed, no workers left");
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn drain(&self, mut workers: JoinSet<()>) {
        tracing::info!(workers = workers.len(), "Waiting for in-flight orders to finish");

        let joined = tokio::time::timeout(self.config.drain_timeout, async {
            while let Some(result) = workers.join_next().await {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Worker task failed");
                }
            }
        })
        .await;

        if joined.is_err() {
            tracing::warn!(
                remaining = workers.len(),
                "Drain timeout elapsed, aborting remaining workers"
            );
            workers.abort_all();
            while workers.join_next().await.is_some() {}
        }
    }

    fn set_state(&self, state: ConsumerState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            tracing::trace!(from = %current, to = %state, "Consumer state change");
            *current = state;
            true
        });
    }
}
