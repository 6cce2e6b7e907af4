//! Unix Socket Lifecycle
//!
//! `Unbound → CleaningStaleFile → Listening → Serving → ShuttingDown → Unbound`.
//!
//! The socket file is owned by the provider for the process lifetime: a stale
//! file is removed before bind, and the file is removed again once serving
//! has stopped, so a restart never trips over "address in use".

use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};

use tokio::net::UnixListener;
use tokio::sync::watch;
use tokio_stream::wrappers::UnixListenerStream;
use tonic::transport::Server;
use tracing::{info, warn};

use crate::error::ProviderError;
use crate::grpc::KeyManagementServiceImpl;
use crate::shutdown::ShutdownSignal;
use crate::smartkey::RemoteCrypto;

/// Lifecycle state of the provider socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    /// No file, no listener
    Unbound,
    /// Removing a file left at the path by a previous process
    CleaningStaleFile,
    /// Bound, not yet accepting RPCs
    Listening,
    /// Accepting and handling RPCs
    Serving,
    /// No longer accepting; draining in-flight RPCs
    ShuttingDown,
}

impl SocketState {
    /// Stable lower-case name
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unbound => "unbound",
            Self::CleaningStaleFile => "cleaning_stale_file",
            Self::Listening => "listening",
            Self::Serving => "serving",
            Self::ShuttingDown => "shutting_down",
        }
    }
}

impl std::fmt::Display for SocketState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The provider's Unix domain socket and its lifecycle.
#[derive(Debug)]
pub struct ProviderSocket {
    path: PathBuf,
    state: watch::Sender<SocketState>,
}

impl ProviderSocket {
    /// Creates an unbound socket for `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let (state, _) = watch::channel(SocketState::Unbound);
        Self {
            path: path.into(),
            state,
        }
    }

    /// Socket file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current lifecycle state
    pub fn state(&self) -> SocketState {
        *self.state.borrow()
    }

    /// Receiver that follows state transitions
    pub fn subscribe(&self) -> watch::Receiver<SocketState> {
        self.state.subscribe()
    }

    fn transition(&self, next: SocketState) {
        let previous = self.state.send_replace(next);
        info!(
            socket = %self.path.display(),
            from = previous.as_str(),
            to = next.as_str(),
            "Socket state changed"
        );
    }

    /// Removes any stale file at the path, then binds the listener.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// `SocketBind` if a live listener owns the path, the stale file cannot be
    /// removed, or binding fails. The state is back to `Unbound` on error.
    pub fn bind(&self) -> Result<UnixListener, ProviderError> {
        self.transition(SocketState::CleaningStaleFile);
        if let Err(e) = clean_stale_socket(&self.path) {
            self.transition(SocketState::Unbound);
            return Err(e);
        }

        match UnixListener::bind(&self.path) {
            Ok(listener) => {
                self.transition(SocketState::Listening);
                Ok(listener)
            }
            Err(e) => {
                self.transition(SocketState::Unbound);
                Err(self.bind_error(e.to_string()))
            }
        }
    }

    /// Serves the KMS service on `listener` until `shutdown` fires, then
    /// drains in-flight RPCs and removes the socket file.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the transport fails; the file is removed anyway.
    pub async fn serve<B: RemoteCrypto>(
        &self,
        listener: UnixListener,
        service: KeyManagementServiceImpl<B>,
        shutdown: ShutdownSignal,
    ) -> Result<(), ProviderError> {
        let incoming = UnixListenerStream::new(listener);
        self.transition(SocketState::Serving);
        info!(socket = %self.path.display(), "KMS provider serving");

        let draining = async {
            shutdown.recv().await;
            self.transition(SocketState::ShuttingDown);
        };

        let result = Server::builder()
            .add_service(service.into_server())
            .serve_with_incoming_shutdown(incoming, draining)
            .await;

        self.release();
        result.map_err(|e| ProviderError::Internal(anyhow::anyhow!("gRPC server: {e}")))
    }

    /// Removes the socket file and returns to `Unbound`.
    fn release(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => info!(socket = %self.path.display(), "Socket file removed"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(socket = %self.path.display(), error = %e, "Failed to remove socket file"),
        }
        self.transition(SocketState::Unbound);
    }

    fn bind_error(&self, reason: impl Into<String>) -> ProviderError {
        ProviderError::SocketBind {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }
}

/// Removes a file left at `path` unless a live listener still answers on it.
///
/// # Errors
///
/// `SocketBind` if the path is in use or the file cannot be removed.
pub fn clean_stale_socket(path: &Path) -> Result<(), ProviderError> {
    let bind_error = |reason: String| ProviderError::SocketBind {
        path: path.to_path_buf(),
        reason,
    };

    match std::fs::symlink_metadata(path) {
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(bind_error(e.to_string())),
        Ok(_) => {}
    }

    if StdUnixStream::connect(path).is_ok() {
        return Err(bind_error("socket is in use by a live listener".to_string()));
    }

    match std::fs::remove_file(path) {
        Ok(()) => {
            info!(socket = %path.display(), "Removed stale socket file");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(bind_error(format!("cannot remove stale file: {e}"))),
    }
}
