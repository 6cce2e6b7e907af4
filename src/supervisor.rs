//! Process supervisor
//!
//! Startup runs strictly in order: metrics and remote client, configuration
//! file and remote pre-flight, diagnostic listener, provider socket. Any
//! failure before the socket serves aborts startup. Afterwards the socket
//! server and the diagnostic server run until shutdown is triggered.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::cli::Args;
use crate::config::ConfigValidator;
use crate::error::ProviderError;
use crate::grpc::{KeyManagementServiceImpl, VersionInfo};
use crate::observability::{
    bind_diagnostics, diagnostics_router, serve_diagnostics, DiagnosticsState, ProviderMetrics,
};
use crate::settings::Settings;
use crate::shutdown::{spawn_signal_listener, ShutdownCoordinator};
use crate::smartkey::SmartKeyClient;
use crate::socket::ProviderSocket;

/// Runs the provider until SIGTERM or SIGINT.
///
/// # Errors
///
/// Any startup error, a signal handler that cannot be installed, or a
/// transport failure while serving.
pub async fn run(args: Args, settings: Settings) -> Result<(), ProviderError> {
    let coordinator = Arc::new(ShutdownCoordinator::new());
    let mut signals = spawn_signal_listener(Arc::clone(&coordinator));

    let serving = run_until_shutdown(&args, &settings, Arc::clone(&coordinator));
    tokio::pin!(serving);

    tokio::select! {
        result = &mut serving => {
            signals.abort();
            result
        }
        joined = &mut signals => {
            let listener_result = joined
                .map_err(|e| ProviderError::Internal(anyhow::anyhow!("signal listener: {e}")))
                .and_then(|r| r);
            if listener_result.is_err() {
                coordinator.trigger();
            }
            let served = serving.await;
            listener_result.and(served)
        }
    }
}

/// Runs the provider until `coordinator` is triggered.
///
/// # Errors
///
/// See [`run`].
pub async fn run_until_shutdown(
    args: &Args,
    settings: &Settings,
    coordinator: Arc<ShutdownCoordinator>,
) -> Result<(), ProviderError> {
    let version = VersionInfo::CURRENT;
    info!(
        protocol_version = version.protocol_version,
        runtime_name = version.runtime_name,
        runtime_version = version.runtime_version,
        "Starting KMS provider"
    );

    let metrics = Arc::new(
        ProviderMetrics::new()
            .map_err(|e| ProviderError::Internal(anyhow::anyhow!("metrics registry: {e}")))?,
    );
    let client = SmartKeyClient::from_settings(settings)?.with_metrics(Arc::clone(&metrics));

    let config = ConfigValidator::new(&client)
        .load(&args.smartkey_config)
        .await?;
    if config.socket_path() != args.socket_file.as_path() {
        warn!(
            cli = %args.socket_file.display(),
            config = %config.socket_path().display(),
            "socketFile in configuration differs from --socketFile; using --socketFile"
        );
    }

    let diagnostics_listener = bind_diagnostics(args.debug_listen_addr).await?;
    let socket = ProviderSocket::new(&args.socket_file);
    let listener = socket.bind()?;

    let router = diagnostics_router(DiagnosticsState::new(
        socket.path(),
        socket.subscribe(),
        Arc::clone(&metrics),
    ));
    let diagnostics = tokio::spawn(serve_diagnostics(
        diagnostics_listener,
        router,
        coordinator.subscribe(),
    ));

    let service = KeyManagementServiceImpl::new(config, Arc::new(client), metrics);
    let result = socket.serve(listener, service, coordinator.subscribe()).await;

    coordinator.trigger();
    match tokio::time::timeout(settings.shutdown_timeout, diagnostics).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => error!(error = %e, "Diagnostic endpoint failed"),
        Ok(Err(e)) => error!(error = %e, "Diagnostic task panicked"),
        Err(_) => warn!(
            timeout_secs = settings.shutdown_timeout.as_secs(),
            "Diagnostic endpoint did not stop in time"
        ),
    }

    if result.is_ok() {
        info!("KMS provider stopped");
    }
    result
}
