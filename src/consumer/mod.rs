//! Queue consumer: a long-polling worker pool with backpressure
//!
//! Delivery is at-least-once. A delivery is acknowledged only after its
//! payment ran; anything not acknowledged (parse failures, failed deletes,
//! deliveries abandoned during shutdown) comes back once the broker's
//! visibility timeout expires, so an order can be paid for twice.
//!
//! ```text
//! polling ──batch──▶ dispatching ──sent──▶ polling
//!    │                    │
//!    └──── shutdown ──────┴──▶ draining ──▶ stopped
//! ```

pub mod config;
pub mod pool;
pub mod stats;
pub mod worker;

use std::fmt;

pub use config::{ConfigError, ConsumerConfig};
pub use pool::WorkerPool;
pub use stats::{ConsumerStats, StatsSnapshot};
pub use worker::{parse_delivery, ProcessError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// Waiting on a long-poll receive (or on the error backoff)
    Polling,
    /// Handing a received batch to the work channel
    Dispatching,
    /// Shutdown requested, waiting for in-flight workers
    Draining,
    Stopped,
}

impl fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsumerState::Polling => write!(f, "polling"),
            ConsumerState::Dispatching => write!(f, "dispatching"),
            ConsumerState::Draining => write!(f, "draining"),
            ConsumerState::Stopped => write!(f, "stopped"),
        }
    }
}
