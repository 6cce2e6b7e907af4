//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::UnixStream;
use tonic::transport::{Channel, Endpoint, Uri};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use smartkey_kms::proto::key_management_service_client::KeyManagementServiceClient;
use smartkey_kms::retry::RetryPolicy;
use smartkey_kms::{ProviderConfig, ProviderError, RemoteCrypto, SmartKeyClient};

pub const API_KEY: &str = "QQ==";
pub const KEY_ID: &str = "u1";
pub const IV: &str = "rFvgbU6EygpLUObqFZxITg==";
pub const CIPHER_PREFIX: &str = "ENC:";

/// Writes a configuration file into `dir` and returns its path.
pub fn write_config(dir: &TempDir, document: &Value) -> PathBuf {
    let path = dir.path().join("smartkey.json");
    std::fs::write(&path, serde_json::to_vec_pretty(document).unwrap()).unwrap();
    path
}

/// A complete configuration document pointing at `endpoint`.
pub fn config_document(endpoint: &str, socket: &Path) -> Value {
    json!({
        "smartkeyApiKey": API_KEY,
        "encryptionKeyUuid": KEY_ID,
        "iv": IV,
        "socketFile": socket.display().to_string(),
        "smartkeyURL": endpoint,
    })
}

pub fn provider_config(endpoint: &str) -> ProviderConfig {
    ProviderConfig::from_parts(API_KEY, KEY_ID, IV, "/tmp/kms.sock", endpoint).unwrap()
}

/// Client with fast retries for tests.
pub fn smartkey_client(max_retries: u32) -> SmartKeyClient {
    let retry = RetryPolicy::new(max_retries, std::time::Duration::from_millis(5));
    SmartKeyClient::new(reqwest::Client::new(), retry)
}

/// Encrypts by prefixing the base64 plaintext; never empty.
pub struct EchoEncrypt;

impl Respond for EchoEncrypt {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = match request.body_json() {
            Ok(body) => body,
            Err(_) => return ResponseTemplate::new(400),
        };
        let plain = body["plain"].as_str().unwrap_or_default();
        ResponseTemplate::new(200).set_body_json(json!({
            "kid": KEY_ID,
            "cipher": format!("{CIPHER_PREFIX}{plain}"),
            "iv": body["iv"],
        }))
    }
}

/// Inverse of [`EchoEncrypt`].
pub struct EchoDecrypt;

impl Respond for EchoDecrypt {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = match request.body_json() {
            Ok(body) => body,
            Err(_) => return ResponseTemplate::new(400),
        };
        match body["cipher"].as_str().and_then(|c| c.strip_prefix(CIPHER_PREFIX)) {
            Some(plain) => ResponseTemplate::new(200).set_body_json(json!({
                "kid": KEY_ID,
                "plain": plain,
                "iv": body["iv"],
            })),
            None => ResponseTemplate::new(400).set_body_string("bad cipher"),
        }
    }
}

pub async fn mount_auth(server: &MockServer, status: u16) {
    Mock::given(method("POST"))
        .and(path("/sys/v1/session/auth"))
        .and(header("authorization", format!("Basic {API_KEY}").as_str()))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

pub async fn mount_key(server: &MockServer, obj_type: &str, key_size: u32) {
    Mock::given(method("GET"))
        .and(path(format!("/crypto/v1/keys/{KEY_ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kid": KEY_ID,
            "obj_type": obj_type,
            "key_size": key_size,
        })))
        .mount(server)
        .await;
}

pub async fn mount_crypto(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(format!("/crypto/v1/keys/{KEY_ID}/encrypt")))
        .respond_with(EchoEncrypt)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/crypto/v1/keys/{KEY_ID}/decrypt")))
        .respond_with(EchoDecrypt)
        .mount(server)
        .await;
}

/// A mock SmartKey that accepts the key and holds an AES-256 key.
pub async fn healthy_smartkey() -> MockServer {
    let server = MockServer::start().await;
    mount_auth(&server, 200).await;
    mount_key(&server, "AES", 256).await;
    mount_crypto(&server).await;
    server
}

/// In-process backend with the same ciphertext form as [`EchoEncrypt`].
#[derive(Default)]
pub struct InMemoryCrypto;

#[async_trait]
impl RemoteCrypto for InMemoryCrypto {
    async fn encrypt(&self, _: &ProviderConfig, plaintext: &[u8]) -> Result<Vec<u8>, ProviderError> {
        Ok(format!("{CIPHER_PREFIX}{}", STANDARD.encode(plaintext)).into_bytes())
    }

    async fn decrypt(&self, _: &ProviderConfig, ciphertext: &[u8]) -> Result<Vec<u8>, ProviderError> {
        let text = std::str::from_utf8(ciphertext).map_err(|_| ProviderError::InvalidCiphertext {
            reason: "not UTF-8".to_string(),
        })?;
        let encoded = text
            .strip_prefix(CIPHER_PREFIX)
            .ok_or_else(|| ProviderError::remote_call("decrypt", "HTTP 400", false))?;
        STANDARD
            .decode(encoded)
            .map_err(|e| ProviderError::malformed("decrypt", e.to_string()))
    }
}

pub fn in_memory() -> Arc<InMemoryCrypto> {
    Arc::new(InMemoryCrypto)
}

/// Connects a KMS client to the Unix socket at `socket`.
pub async fn connect(socket: &Path) -> KeyManagementServiceClient<Channel> {
    let socket = socket.to_path_buf();
    let channel = Endpoint::try_from("http://[::]:50051")
        .unwrap()
        .connect_with_connector(tower::service_fn(move |_: Uri| {
            let socket = socket.clone();
            async move { Ok::<_, std::io::Error>(TokioIo::new(UnixStream::connect(socket).await?)) }
        }))
        .await
        .unwrap();
    KeyManagementServiceClient::new(channel)
}

/// Waits until something accepts connections on `socket`.
pub async fn wait_for_socket(socket: &Path) {
    for _ in 0..200 {
        if UnixStream::connect(socket).await.is_ok() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("socket {} never became ready", socket.display());
}
