//! Single-slot gate in front of the synchronous payment path.
//!
//! The downstream gateway accepts one payment at a time, so every synchronous
//! submission queues on this gate. There is no timeout: a caller waits as long
//! as it takes, and system-wide throughput tops out at one payment per
//! payment latency.

use std::future::Future;
use tokio::sync::{Semaphore, SemaphorePermit};

pub struct SubmissionGate {
    permit: Semaphore,
}

/// Exclusive hold on the gate.
///
/// Dropping the guard returns the permit, so it comes back on every exit
/// path: normal return, `?` propagation, panic unwinding and future
/// cancellation.
#[must_use = "the gate is released as soon as the guard is dropped"]
pub struct GateGuard<'a> {
    _permit: SemaphorePermit<'a>,
}

impl SubmissionGate {
    pub fn new() -> Self {
        Self {
            permit: Semaphore::new(1),
        }
    }

    /// Wait until the gate is free and take it.
    pub async fn acquire(&self) -> GateGuard<'_> {
        // The semaphore is owned here and never closed.
        let permit = match self.permit.acquire().await {
            Ok(permit) => permit,
            Err(_) => unreachable!("submission gate semaphore closed"),
        };
        GateGuard { _permit: permit }
    }

    /// Hand the gate back.
    pub fn release(&self, guard: GateGuard<'_>) {
        drop(guard);
    }

    /// Run `fut` while holding the gate.
    pub async fn run<F, T>(&self, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        let _guard = self.acquire().await;
        fut.await
    }

    /// True while some caller holds the gate
    pub fn is_held(&self) -> bool {
        self.permit.available_permits() == 0
    }
}

impl Default for SubmissionGate {
    fn default() -> Self {
        Self::new()
    }
}
