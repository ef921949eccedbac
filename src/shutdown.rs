//! Process shutdown on SIGINT / SIGTERM.
//!
//! The coordinator owns a [`CancellationToken`]. The poll loop stops polling
//! when the token is cancelled, workers finish the message they hold, and the
//! HTTP server stops accepting connections.

use std::io;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Coordinator that only shuts down when [`trigger`](Self::trigger) is called
    pub fn new() -> Self {
        Self::default()
    }

    /// Install signal handlers and cancel the token on the first signal.
    ///
    /// Fails if the SIGTERM handler cannot be registered.
    pub fn install() -> io::Result<(Self, JoinHandle<()>)> {
        let coordinator = Self::new();

        #[cfg(unix)]
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

        let token = coordinator.token.clone();
        let handle = tokio::spawn(async move {
            let ctrl_c = async {
                if let Err(e) = signal::ctrl_c().await {
                    tracing::error!("Failed to listen for Ctrl+C: {}", e);
                    std::future::pending::<()>().await;
                }
            };

            #[cfg(unix)]
            let terminate = async {
                sigterm.recv().await;
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => {
                    tracing::info!("Received Ctrl+C signal, shutting down gracefully...");
                }
                _ = terminate => {
                    tracing::info!("Received SIGTERM signal, shutting down gracefully...");
                }
                _ = token.cancelled() => return,
            }

            token.cancel();
        });

        Ok((coordinator, handle))
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once shutdown has been requested
    pub async fn wait(&self) {
        self.token.cancelled().await;
    }
}
