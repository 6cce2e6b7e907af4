//! SmartKey REST client
//!
//! Issues the authentication, key-metadata, encrypt and decrypt calls against
//! the remote KMS. Every call is bounded by the HTTP client's timeouts and the
//! retry policy; request bodies are serialized from typed structs.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};
use url::Url;

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::http::build_http_client;
use crate::observability::ProviderMetrics;
use crate::retry::{RemoteOperation, RetryPolicy};
use crate::settings::Settings;
use crate::smartkey::models::{
    DecryptBody, DecryptResponse, EncryptBody, EncryptResponse, KeyObject,
};
use crate::smartkey::RemoteCrypto;

const OP_AUTH: RemoteOperation = RemoteOperation::Authenticate;
const OP_KEY_METADATA: RemoteOperation = RemoteOperation::KeyMetadata;
const OP_ENCRYPT: RemoteOperation = RemoteOperation::Encrypt;
const OP_DECRYPT: RemoteOperation = RemoteOperation::Decrypt;

/// Client for the SmartKey REST API
#[derive(Clone)]
pub struct SmartKeyClient {
    http: Client,
    retry: RetryPolicy,
    metrics: Option<Arc<ProviderMetrics>>,
}

impl SmartKeyClient {
    /// Creates a client from a prepared HTTP client and retry policy.
    #[must_use]
    pub const fn new(http: Client, retry: RetryPolicy) -> Self {
        Self {
            http,
            retry,
            metrics: None,
        }
    }

    /// Creates a client configured from process settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_settings(settings: &Settings) -> Result<Self, ProviderError> {
        let http = build_http_client(&settings.http_config())
            .map_err(|e| ProviderError::Internal(anyhow::anyhow!("HTTP client: {e}")))?;
        Ok(Self::new(http, settings.retry_policy()))
    }

    /// Records remote call outcomes into `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<ProviderMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Checks that the API key is accepted (`POST /sys/v1/session/auth`).
    ///
    /// # Errors
    ///
    /// `RemoteCallFailed` on transport error or any status other than 200.
    #[instrument(skip_all)]
    pub async fn authenticate(&self, config: &ProviderConfig) -> Result<(), ProviderError> {
        let url = config.endpoint_url(&["sys", "v1", "session", "auth"]);
        let result = self
            .call(OP_AUTH, Method::POST, &url, config, None::<&()>)
            .await
            .and_then(|response| {
                if response.status() == StatusCode::OK {
                    Ok(())
                } else {
                    Err(ProviderError::remote_call(
                        OP_AUTH.as_str(),
                        format!("authentication returned HTTP {}", response.status()),
                        false,
                    ))
                }
            });
        self.record(OP_AUTH, &result);
        result
    }

    /// Reads the metadata of the configured key (`GET /crypto/v1/keys/{id}`).
    ///
    /// # Errors
    ///
    /// `RemoteCallFailed` on transport error or non-2xx status,
    /// `RemoteResponseMalformed` if the body is not key metadata.
    #[instrument(skip_all, fields(key_id = %config.key_id()))]
    pub async fn key_metadata(&self, config: &ProviderConfig) -> Result<KeyObject, ProviderError> {
        let url = config.endpoint_url(&["crypto", "v1", "keys", config.key_id()]);
        let result = match self
            .call(OP_KEY_METADATA, Method::GET, &url, config, None::<&()>)
            .await
        {
            Ok(response) => decode(OP_KEY_METADATA.as_str(), response).await,
            Err(e) => Err(e),
        };
        self.record(OP_KEY_METADATA, &result);
        result
    }

    /// Encrypts `plaintext` remotely and returns the `cipher` field verbatim.
    ///
    /// # Errors
    ///
    /// `RemoteCallFailed` on transport error or non-2xx status,
    /// `RemoteResponseMalformed` if the response has no ciphertext.
    #[instrument(skip_all, fields(key_id = %config.key_id(), plaintext_len = plaintext.len()))]
    pub async fn encrypt(
        &self,
        config: &ProviderConfig,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, ProviderError> {
        let url = config.endpoint_url(&["crypto", "v1", "keys", config.key_id(), "encrypt"]);
        let body = EncryptBody::new(config, STANDARD.encode(plaintext));

        let result = match self.call(OP_ENCRYPT, Method::POST, &url, config, Some(&body)).await {
            Ok(response) => decode::<EncryptResponse>(OP_ENCRYPT.as_str(), response)
                .await
                .and_then(|decoded| match decoded.cipher {
                    Some(cipher) if !cipher.is_empty() => Ok(cipher.into_bytes()),
                    _ => Err(ProviderError::malformed(OP_ENCRYPT.as_str(), "response lacks cipher")),
                }),
            Err(e) => Err(e),
        };
        self.record(OP_ENCRYPT, &result);
        result
    }

    /// Decrypts ciphertext produced by [`SmartKeyClient::encrypt`].
    ///
    /// # Errors
    ///
    /// `InvalidCiphertext` if the input is not the remote serialized form,
    /// `RemoteCallFailed` on transport error or non-2xx status,
    /// `RemoteResponseMalformed` if the response has no valid base64 plaintext.
    #[instrument(skip_all, fields(key_id = %config.key_id(), ciphertext_len = ciphertext.len()))]
    pub async fn decrypt(
        &self,
        config: &ProviderConfig,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, ProviderError> {
        let cipher = std::str::from_utf8(ciphertext).map_err(|_| ProviderError::InvalidCiphertext {
            reason: "ciphertext is not valid UTF-8".to_string(),
        })?;
        if cipher.is_empty() {
            return Err(ProviderError::InvalidCiphertext {
                reason: "ciphertext is empty".to_string(),
            });
        }

        let url = config.endpoint_url(&["crypto", "v1", "keys", config.key_id(), "decrypt"]);
        let body = DecryptBody::new(config, cipher);

        let result = match self.call(OP_DECRYPT, Method::POST, &url, config, Some(&body)).await {
            Ok(response) => decode::<DecryptResponse>(OP_DECRYPT.as_str(), response)
                .await
                .and_then(|decoded| {
                    let plain = decoded
                        .plain
                        .ok_or_else(|| ProviderError::malformed(OP_DECRYPT.as_str(), "response lacks plain"))?;
                    STANDARD.decode(plain).map_err(|e| {
                        ProviderError::malformed(OP_DECRYPT.as_str(), format!("plain is not base64: {e}"))
                    })
                }),
            Err(e) => Err(e),
        };
        self.record(OP_DECRYPT, &result);
        result
    }

    /// Sends one request under the retry policy; pre-flight checks get a
    /// single attempt.
    async fn call<B: Serialize + ?Sized>(
        &self,
        operation: RemoteOperation,
        method: Method,
        url: &Url,
        config: &ProviderConfig,
        body: Option<&B>,
    ) -> Result<Response, ProviderError> {
        self.retry
            .execute(operation, || self.send(operation, method.clone(), url, config, body))
            .await
    }

    /// Sends a single attempt and rejects non-2xx statuses.
    async fn send<B: Serialize + ?Sized>(
        &self,
        operation: RemoteOperation,
        method: Method,
        url: &Url,
        config: &ProviderConfig,
        body: Option<&B>,
    ) -> Result<Response, ProviderError> {
        let mut request = self
            .http
            .request(method, url.clone())
            .header(AUTHORIZATION, format!("Basic {}", config.api_key()))
            .header(CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            let transient = e.is_timeout() || e.is_connect();
            ProviderError::remote_call(operation.as_str(), e.without_url().to_string(), transient)
        })?;

        let status = response.status();
        debug!(
            operation = operation.as_str(),
            status = status.as_u16(),
            "Remote KMS responded"
        );
        if status.is_success() {
            Ok(response)
        } else {
            Err(ProviderError::remote_call(
                operation.as_str(),
                format!("remote returned HTTP {status}"),
                is_transient_status(status),
            ))
        }
    }

    fn record<T>(&self, operation: RemoteOperation, result: &Result<T, ProviderError>) {
        if let Some(metrics) = &self.metrics {
            let outcome = match result {
                Ok(_) => "ok",
                Err(e) => e.code().as_str(),
            };
            metrics.record_remote_call(operation.as_str(), outcome);
        }
    }
}

#[async_trait]
impl RemoteCrypto for SmartKeyClient {
    async fn encrypt(
        &self,
        config: &ProviderConfig,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, ProviderError> {
        Self::encrypt(self, config, plaintext).await
    }

    async fn decrypt(
        &self,
        config: &ProviderConfig,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, ProviderError> {
        Self::decrypt(self, config, ciphertext).await
    }
}

/// Statuses worth another attempt
fn is_transient_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

/// Reads the body and decodes it as JSON.
async fn decode<T: DeserializeOwned>(
    operation: &'static str,
    response: Response,
) -> Result<T, ProviderError> {
    let bytes = response.bytes().await.map_err(|e| {
        ProviderError::remote_call(operation, e.without_url().to_string(), false)
    })?;
    serde_json::from_slice(&bytes).map_err(|e| ProviderError::malformed(operation, e.to_string()))
}
