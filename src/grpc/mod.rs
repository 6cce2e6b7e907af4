//! gRPC Service Implementation
//!
//! Implements the KMS v1beta1 `KeyManagementService`. Handlers are stateless
//! with respect to each other: the only shared state is the read-only
//! provider configuration and the metrics registry.

use std::sync::Arc;
use std::time::Instant;

use tonic::{Request, Response, Status};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::observability::ProviderMetrics;
use crate::proto::key_management_service_server::{
    KeyManagementService, KeyManagementServiceServer,
};
use crate::proto::{
    DecryptRequest, DecryptResponse, EncryptRequest, EncryptResponse, VersionRequest,
    VersionResponse,
};
use crate::smartkey::RemoteCrypto;

/// KMS API version implemented by the plugin.
pub const PROTOCOL_VERSION: &str = "v1beta1";
/// Runtime name reported to the API server.
pub const RUNTIME_NAME: &str = "SmartKey";
/// Runtime version reported to the API server.
pub const RUNTIME_VERSION: &str = "0.1.0";

/// Fixed version triple returned by every `Version` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    /// KMS API version
    pub protocol_version: &'static str,
    /// Runtime name
    pub runtime_name: &'static str,
    /// Runtime version
    pub runtime_version: &'static str,
}

impl VersionInfo {
    /// The provider's version triple.
    pub const CURRENT: Self = Self {
        protocol_version: PROTOCOL_VERSION,
        runtime_name: RUNTIME_NAME,
        runtime_version: RUNTIME_VERSION,
    };
}

impl From<VersionInfo> for VersionResponse {
    fn from(info: VersionInfo) -> Self {
        Self {
            version: info.protocol_version.to_string(),
            runtime_name: info.runtime_name.to_string(),
            runtime_version: info.runtime_version.to_string(),
        }
    }
}

/// KMS provider service delegating cryptography to a remote backend.
pub struct KeyManagementServiceImpl<B> {
    config: Arc<ProviderConfig>,
    backend: Arc<B>,
    metrics: Arc<ProviderMetrics>,
}

impl<B: RemoteCrypto> KeyManagementServiceImpl<B> {
    /// Creates the service around a validated configuration.
    pub fn new(config: Arc<ProviderConfig>, backend: Arc<B>, metrics: Arc<ProviderMetrics>) -> Self {
        Self {
            config,
            backend,
            metrics,
        }
    }

    /// Wraps the service in the generated tonic server.
    pub fn into_server(self) -> KeyManagementServiceServer<Self> {
        KeyManagementServiceServer::new(self)
    }

    /// Runs a delegated call with in-flight tracking, metrics and error mapping.
    async fn relay<F>(&self, method: &'static str, call: F) -> Result<Vec<u8>, Status>
    where
        F: std::future::Future<Output = Result<Vec<u8>, ProviderError>>,
    {
        let correlation_id = Uuid::new_v4();
        let start = Instant::now();
        self.metrics.inc_in_flight();

        let result = call.await;

        self.metrics.dec_in_flight();
        match result {
            Ok(bytes) => {
                self.metrics.record_request(method, "ok", start.elapsed());
                info!(
                    method,
                    correlation_id = %correlation_id,
                    output_len = bytes.len(),
                    "Request completed"
                );
                Ok(bytes)
            }
            Err(error) => {
                self.metrics
                    .record_request(method, error.code().as_str(), start.elapsed());
                warn!(
                    method,
                    correlation_id = %correlation_id,
                    error_code = error.code().as_str(),
                    error = %error,
                    "Request failed"
                );
                Err(error.to_status(correlation_id))
            }
        }
    }
}

#[tonic::async_trait]
impl<B: RemoteCrypto> KeyManagementService for KeyManagementServiceImpl<B> {
    #[instrument(skip_all)]
    async fn version(
        &self,
        request: Request<VersionRequest>,
    ) -> Result<Response<VersionResponse>, Status> {
        let requested = request.into_inner().version;
        let start = Instant::now();
        if !requested.is_empty() && requested != PROTOCOL_VERSION {
            warn!(requested = %requested, "Caller speaks a different KMS API version");
        }
        self.metrics.record_request("Version", "ok", start.elapsed());
        Ok(Response::new(VersionInfo::CURRENT.into()))
    }

    #[instrument(skip_all)]
    async fn decrypt(
        &self,
        request: Request<DecryptRequest>,
    ) -> Result<Response<DecryptResponse>, Status> {
        let cipher = request.into_inner().cipher;
        let plain = self
            .relay("Decrypt", self.backend.decrypt(&self.config, &cipher))
            .await?;
        Ok(Response::new(DecryptResponse { plain }))
    }

    #[instrument(skip_all)]
    async fn encrypt(
        &self,
        request: Request<EncryptRequest>,
    ) -> Result<Response<EncryptResponse>, Status> {
        let plain = request.into_inner().plain;
        let cipher = self
            .relay("Encrypt", self.backend.encrypt(&self.config, &plain))
            .await?;
        Ok(Response::new(EncryptResponse { cipher }))
    }
}
