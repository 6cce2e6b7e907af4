//! Graceful Shutdown Module
//!
//! A termination signal observed by a dedicated task flips a watch channel
//! exactly once; the socket server and the diagnostic server both hold a
//! [`ShutdownSignal`] and stop when it fires.

use std::sync::Arc;

use tokio::signal;
use tokio::sync::watch;
use tracing::info;

use crate::error::ProviderError;

/// Shutdown coordinator for graceful termination
#[derive(Debug)]
pub struct ShutdownCoordinator {
    trigger_tx: watch::Sender<bool>,
}

impl ShutdownCoordinator {
    /// Creates a new shutdown coordinator
    pub fn new() -> Self {
        let (trigger_tx, _) = watch::channel(false);
        Self { trigger_tx }
    }

    /// Gets a shutdown receiver
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.trigger_tx.subscribe(),
        }
    }

    /// Initiates shutdown. Returns `true` only for the call that triggered it.
    pub fn trigger(&self) -> bool {
        let first = self.trigger_tx.send_if_modified(|triggered| {
            let first = !*triggered;
            *triggered = true;
            first
        });
        if first {
            info!("Initiating graceful shutdown");
        }
        first
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Shutdown signal receiver
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Waits for the shutdown signal. A dropped coordinator counts as shutdown.
    pub async fn recv(mut self) {
        let _ = self.receiver.wait_for(|triggered| *triggered).await;
    }
}

/// Installs SIGTERM and SIGINT handlers and waits for either.
///
/// # Errors
///
/// Returns `Signal` if a handler cannot be installed.
pub async fn wait_for_signal() -> Result<&'static str, ProviderError> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .map_err(|e| ProviderError::Signal(e.to_string()))?;

        tokio::select! {
            result = signal::ctrl_c() => {
                result.map_err(|e| ProviderError::Signal(e.to_string()))?;
                Ok("SIGINT")
            }
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c()
            .await
            .map_err(|e| ProviderError::Signal(e.to_string()))?;
        Ok("SIGINT")
    }
}

/// Spawns the task that turns a termination signal into shutdown.
///
/// SIGTERM handler installation happens inside the task, so a failure there is
/// reported through the returned handle.
pub fn spawn_signal_listener(
    coordinator: Arc<ShutdownCoordinator>,
) -> tokio::task::JoinHandle<Result<(), ProviderError>> {
    tokio::spawn(async move {
        let received = wait_for_signal().await?;
        info!(signal = received, "Shutdown signal received");
        coordinator.trigger();
        Ok(())
    })
}
