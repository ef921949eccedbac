//! Payment step shared by both submission paths.
//!
//! The real gateway is out of reach, so [`SimulatedPayment`] stands in for it
//! with a plain delay. The delay is the only suspension point a worker hits
//! while it owns an order.

use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;

use crate::order::Order;

/// Latency of the stubbed gateway call
pub const DEFAULT_PAYMENT_LATENCY: Duration = Duration::from_secs(3);

/// A payment gateway call.
///
/// The call cannot fail: a slow gateway is modelled, an unreliable one is not.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn process(&self, order: &Order);
}

/// How long a simulated payment takes
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Latency {
    Fixed(Duration),
    /// Uniformly distributed in `[min, max]`
    Uniform { min: Duration, max: Duration },
}

impl Latency {
    fn sample(&self) -> Duration {
        match *self {
            Latency::Fixed(d) => d,
            Latency::Uniform { min, max } if max <= min => min,
            Latency::Uniform { min, max } => rand::thread_rng().gen_range(min..=max),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedPayment {
    latency: Latency,
}

impl SimulatedPayment {
    pub fn new(latency: Latency) -> Self {
        Self { latency }
    }

    pub fn fixed(latency: Duration) -> Self {
        Self::new(Latency::Fixed(latency))
    }

    /// Fixed latency when `jitter_ms` is zero, otherwise uniform in
    /// `[latency_ms, latency_ms + jitter_ms]`.
    pub fn from_millis(latency_ms: u64, jitter_ms: u64) -> Self {
        let min = Duration::from_millis(latency_ms);
        if jitter_ms == 0 {
            return Self::fixed(min);
        }
        Self::new(Latency::Uniform {
            min,
            max: min + Duration::from_millis(jitter_ms),
        })
    }

    pub fn latency(&self) -> Latency {
        self.latency
    }
}

impl Default for SimulatedPayment {
    fn default() -> Self {
        Self::fixed(DEFAULT_PAYMENT_LATENCY)
    }
}

#[async_trait]
impl PaymentProcessor for SimulatedPayment {
    async fn process(&self, order: &Order) {
        let delay = self.latency.sample();
        tracing::debug!(
            order_id = %order.order_id,
            delay_ms = delay.as_millis() as u64,
            "Simulating payment"
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_latency_stays_in_range() {
        let latency = Latency::Uniform {
            min: Duration::from_millis(10),
            max: Duration::from_millis(20),
        };
        for _ in 0..100 {
            let d = latency.sample();
            assert!(d >= Duration::from_millis(10) && d <= Duration::from_millis(20));
        }
    }

    #[test]
    fn test_from_millis_picks_latency_shape() {
        assert_eq!(
            SimulatedPayment::from_millis(100, 0).latency(),
            Latency::Fixed(Duration::from_millis(100))
        );
        assert_eq!(
            SimulatedPayment::from_millis(100, 50).latency(),
            Latency::Uniform {
                min: Duration::from_millis(100),
                max: Duration::from_millis(150),
            }
        );
    }

    #[test]
    fn test_degenerate_uniform_range_uses_min() {
        let latency = Latency::Uniform {
            min: Duration::from_millis(30),
            max: Duration::from_millis(10),
        };
        assert_eq!(latency.sample(), Duration::from_millis(30));
    }
}
