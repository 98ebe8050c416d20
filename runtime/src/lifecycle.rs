//! Process lifecycle and graceful shutdown.
//!
//! When a shutdown signal is received (Ctrl+C or SIGTERM):
//! 1. The HTTP server stops accepting new connections
//! 2. [`Shutdown::trigger`] broadcasts to every consumer
//! 3. [`Shutdown::drain`] waits for background tasks (bounded per task)

use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Shutdown broadcaster owned by `main`.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    /// Create a broadcaster with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// A receiver that fires once [`Shutdown::trigger`] is called.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Tell every subscriber to stop.
    pub fn trigger(&self) {
        let receivers = self.tx.send(()).unwrap_or(0);
        info!(receivers, "Shutdown signal broadcast");
    }

    /// Wait for background tasks to finish, giving each up to `timeout`.
    pub async fn drain(handles: Vec<(String, JoinHandle<()>)>, timeout: Duration) {
        for (name, handle) in handles {
            match tokio::time::timeout(timeout, handle).await {
                Ok(Ok(())) => info!(task = %name, "Task stopped gracefully"),
                Ok(Err(e)) => warn!(task = %name, error = %e, "Task failed"),
                Err(_) => warn!(task = %name, "Task shutdown timed out"),
            }
        }
    }
}

/// Resolve when the process receives SIGINT (Ctrl+C) or SIGTERM.
///
/// If a handler cannot be installed the error is logged and that signal is
/// ignored.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C signal"),
        () = terminate => info!("Received SIGTERM signal"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_reaches_every_subscriber() {
        let shutdown = Shutdown::new();
        let mut a = shutdown.subscribe();
        let mut b = shutdown.subscribe();
        shutdown.trigger();
        a.recv().await.unwrap();
        b.recv().await.unwrap();
    }

    #[tokio::test]
    async fn drain_waits_for_tasks() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();
        let task = tokio::spawn(async move {
            let _ = rx.recv().await;
        });
        shutdown.trigger();
        Shutdown::drain(vec![("task".into(), task)], Duration::from_secs(1)).await;
    }
}
