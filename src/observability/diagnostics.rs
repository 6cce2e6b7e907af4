//! Diagnostic HTTP endpoint
//!
//! Serves `/healthz`, `/metrics` and `/debug/status` on a TCP address
//! separate from the KMS socket. Nothing served here ever includes the API
//! key, the IV or request payloads.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

use crate::error::ProviderError;
use crate::grpc::VersionInfo;
use crate::observability::ProviderMetrics;
use crate::shutdown::ShutdownSignal;
use crate::socket::SocketState;

/// Shared state of the diagnostic handlers
#[derive(Clone)]
pub struct DiagnosticsState {
    started_at: DateTime<Utc>,
    socket_path: PathBuf,
    socket_state: watch::Receiver<SocketState>,
    metrics: Arc<ProviderMetrics>,
}

impl DiagnosticsState {
    /// Creates handler state; the start time is taken now.
    pub fn new(
        socket_path: impl Into<PathBuf>,
        socket_state: watch::Receiver<SocketState>,
        metrics: Arc<ProviderMetrics>,
    ) -> Self {
        Self {
            started_at: Utc::now(),
            socket_path: socket_path.into(),
            socket_state,
            metrics,
        }
    }

    fn current_state(&self) -> SocketState {
        *self.socket_state.borrow()
    }
}

/// Body of `/debug/status`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    #[serde(flatten)]
    version: VersionInfo,
    socket_state: &'static str,
    socket_path: String,
    started_at: DateTime<Utc>,
    uptime_seconds: i64,
}

/// Builds the diagnostic router.
pub fn diagnostics_router(state: DiagnosticsState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/debug/status", get(status))
        .with_state(state)
}

async fn healthz(State(state): State<DiagnosticsState>) -> (StatusCode, &'static str) {
    match state.current_state() {
        SocketState::Serving => (StatusCode::OK, "ok"),
        other => (StatusCode::SERVICE_UNAVAILABLE, other.as_str()),
    }
}

async fn metrics(State(state): State<DiagnosticsState>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn status(State(state): State<DiagnosticsState>) -> Json<StatusReport> {
    let now = Utc::now();
    Json(StatusReport {
        version: VersionInfo::CURRENT,
        socket_state: state.current_state().as_str(),
        socket_path: state.socket_path.display().to_string(),
        started_at: state.started_at,
        uptime_seconds: (now - state.started_at).num_seconds(),
    })
}

/// Binds the diagnostic listener.
///
/// # Errors
///
/// `DiagnosticsBind` if the address cannot be bound.
pub async fn bind_diagnostics(addr: SocketAddr) -> Result<TcpListener, ProviderError> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| ProviderError::DiagnosticsBind {
            addr: addr.to_string(),
            reason: e.to_string(),
        })
}

/// Serves `router` on `listener` until `shutdown` fires.
///
/// # Errors
///
/// Returns `Internal` if the server fails.
pub async fn serve_diagnostics(
    listener: TcpListener,
    router: Router,
    shutdown: ShutdownSignal,
) -> Result<(), ProviderError> {
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "Diagnostic endpoint listening");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.recv())
        .await
        .map_err(|e| ProviderError::Internal(anyhow::anyhow!("diagnostic server: {e}")))
}
