//! Counters kept by the poll loop and the workers.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ConsumerStats {
    polls: AtomicU64,
    empty_polls: AtomicU64,
    poll_errors: AtomicU64,
    received: AtomicU64,
    processed: AtomicU64,
    acked: AtomicU64,
    ack_failures: AtomicU64,
    parse_failures: AtomicU64,
    panics: AtomicU64,
}

/// Point-in-time copy of [`ConsumerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub polls: u64,
    pub empty_polls: u64,
    pub poll_errors: u64,
    pub received: u64,
    /// Orders that went through payment
    pub processed: u64,
    pub acked: u64,
    pub ack_failures: u64,
    /// Deliveries abandoned to broker redelivery
    pub parse_failures: u64,
    /// Deliveries whose handling panicked; also left for redelivery
    pub panics: u64,
}

impl ConsumerStats {
    pub(crate) fn record_poll(&self, delivered: usize) {
        self.polls.fetch_add(1, Ordering::Relaxed);
        if delivered == 0 {
            self.empty_polls.fetch_add(1, Ordering::Relaxed);
        }
        self.received.fetch_add(delivered as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_poll_error(&self) {
        self.polls.fetch_add(1, Ordering::Relaxed);
        self.poll_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_ack(&self, ok: bool) {
        if ok {
            self.acked.fetch_add(1, Ordering::Relaxed);
        } else {
            self.ack_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_parse_failure(&self) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_panic(&self) {
        self.panics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            polls: self.polls.load(Ordering::Relaxed),
            empty_polls: self.empty_polls.load(Ordering::Relaxed),
            poll_errors: self.poll_errors.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
            ack_failures: self.ack_failures.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            panics: self.panics.load(Ordering::Relaxed),
        }
    }
}
