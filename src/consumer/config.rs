//! Worker pool configuration.

use std::time::Duration;
use thiserror::Error;

use crate::broker::ReceiveOptions;

#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerConfig {
    /// Number of concurrent workers, and so the cap on concurrent payments
    pub workers: usize,
    /// Maximum deliveries requested per poll
    pub batch_size: usize,
    /// Long-poll wait per receive
    pub wait_time: Duration,
    /// Broker visibility window for received messages
    pub visibility_timeout: Duration,
    /// Deliveries that may sit between the poll loop and the workers
    pub channel_capacity: usize,
    /// Pause after a failed receive
    pub poll_error_backoff: Duration,
    /// How long in-flight workers get to finish after shutdown is requested
    pub drain_timeout: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            batch_size: 10,
            wait_time: Duration::from_secs(20),
            visibility_timeout: Duration::from_secs(30),
            channel_capacity: 100,
            poll_error_backoff: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{0} must be at least 1")]
    Zero(&'static str),
    #[error("visibility timeout must be non-zero")]
    ZeroVisibility,
}

impl ConsumerConfig {
    /// Read configuration from environment variables.
    ///
    /// Missing variables fall back to the defaults. Unparseable values, and
    /// zero for anything but the wait, backoff and drain durations, are
    /// logged and replaced by the default.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `NUM_WORKERS` | 1 |
    /// | `POLL_BATCH_SIZE` | 10 |
    /// | `POLL_WAIT_SECS` | 20 |
    /// | `VISIBILITY_TIMEOUT_SECS` | 30 |
    /// | `WORK_CHANNEL_CAPACITY` | 100 |
    /// | `POLL_ERROR_BACKOFF_SECS` | 5 |
    /// | `DRAIN_TIMEOUT_SECS` | 30 |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            workers: positive_env("NUM_WORKERS", defaults.workers),
            batch_size: positive_env("POLL_BATCH_SIZE", defaults.batch_size),
            wait_time: secs_env("POLL_WAIT_SECS", defaults.wait_time, 0),
            visibility_timeout: secs_env(
                "VISIBILITY_TIMEOUT_SECS",
                defaults.visibility_timeout,
                1,
            ),
            channel_capacity: positive_env("WORK_CHANNEL_CAPACITY", defaults.channel_capacity),
            poll_error_backoff: secs_env("POLL_ERROR_BACKOFF_SECS", defaults.poll_error_backoff, 0),
            drain_timeout: secs_env("DRAIN_TIMEOUT_SECS", defaults.drain_timeout, 0),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Zero("workers"));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Zero("batch_size"));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Zero("channel_capacity"));
        }
        if self.visibility_timeout.is_zero() {
            return Err(ConfigError::ZeroVisibility);
        }
        Ok(())
    }

    pub fn receive_options(&self) -> ReceiveOptions {
        ReceiveOptions {
            max_messages: self.batch_size,
            wait_time: self.wait_time,
            visibility_timeout: self.visibility_timeout,
        }
    }
}

fn positive_env(key: &str, default: usize) -> usize {
    let Ok(raw) = std::env::var(key) else {
        return default;
    };
    match raw.trim().parse::<usize>() {
        Ok(value) if value > 0 => value,
        _ => {
            tracing::warn!("Invalid {} value: {}, defaulting to {}", key, raw, default);
            default
        }
    }
}

/// Whole seconds from `key`, at least `min_secs`.
fn secs_env(key: &str, default: Duration, min_secs: u64) -> Duration {
    let Ok(raw) = std::env::var(key) else {
        return default;
    };
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs >= min_secs => Duration::from_secs(secs),
        _ => {
            tracing::warn!(
                "Invalid {} value: {}, defaulting to {}s",
                key,
                raw,
                default.as_secs()
            );
            default
        }
    }
}
