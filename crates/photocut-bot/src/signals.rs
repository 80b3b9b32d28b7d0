//! Shutdown on SIGTERM/SIGINT.
//!
//! [`run`](crate::run) installs one [`SignalHandler`] and gives the poll
//! loop a [`ShutdownHandle`]. Once it fires, no further updates are fetched
//! and the loop waits for commands that are already running, such as a
//! `/cut` still uploading its excerpt.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

/// Owns the shutdown flag and flips it on the first termination signal.
pub struct SignalHandler {
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalHandler {
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        }
    }

    /// Starts a background task that waits for SIGTERM or SIGINT (Ctrl+C
    /// elsewhere) and then requests shutdown.
    pub fn spawn_listener(&self) {
        let shutdown_tx = self.shutdown_tx.clone();

        tokio::spawn(async move {
            let signal = termination().await;
            info!(signal, "shutting down, no new commands will be accepted");
            let _ = shutdown_tx.send(true);
        });
    }

    /// Returns true once shutdown was requested, by a signal or a handle.
    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
            rx: self.shutdown_rx.clone(),
        }
    }
}

/// Resolves with the name of the first termination signal received.
#[cfg(unix)]
async fn termination() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        },
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "cannot install SIGTERM/SIGINT handlers, falling back to Ctrl+C");
            ctrl_c().await
        }
    }
}

#[cfg(not(unix))]
async fn termination() -> &'static str {
    ctrl_c().await
}

async fn ctrl_c() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        // Only a ShutdownHandle can stop the bot now.
        warn!(error = %e, "cannot listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    "Ctrl+C"
}

/// Completes once shutdown is requested.
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub async fn wait(mut self) {
        // A dropped sender also counts as shutdown.
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

/// Cloneable view of the shutdown flag, handed to the poll loop.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl ShutdownHandle {
    /// Requests shutdown, as a signal would.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Returns a signal to race against a long poll in `tokio::select!`.
    pub fn wait(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.rx.clone(),
        }
    }
}
