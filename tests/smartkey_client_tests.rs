//! Remote crypto client behaviour against a mock SmartKey.

mod common;

use std::sync::Arc;

use common::*;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use smartkey_kms::observability::ProviderMetrics;
use smartkey_kms::ProviderError;

fn encrypt_path() -> String {
    format!("/crypto/v1/keys/{KEY_ID}/encrypt")
}

fn decrypt_path() -> String {
    format!("/crypto/v1/keys/{KEY_ID}/decrypt")
}

#[tokio::test]
async fn test_encrypt_sends_structured_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(encrypt_path()))
        .and(header("authorization", "Basic QQ=="))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({
            "alg": "AES",
            "mode": "CBC",
            "iv": IV,
            "plain": "ImRlayJcbg==",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kid": KEY_ID,
            "cipher": "opaque-cipher",
            "iv": IV,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = provider_config(&server.uri());
    let cipher = smartkey_client(0)
        .encrypt(&config, b"\"dek\"\\n")
        .await
        .unwrap();
    assert_eq!(cipher, b"opaque-cipher");
}

#[tokio::test]
async fn test_decrypt_passes_cipher_verbatim_and_decodes_plain() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(decrypt_path()))
        .and(body_json(json!({
            "alg": "AES",
            "mode": "CBC",
            "iv": IV,
            "cipher": "opaque-cipher",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kid": KEY_ID,
            "plain": "ZGVr",
            "iv": IV,
        })))
        .mount(&server)
        .await;

    let config = provider_config(&server.uri());
    let plain = smartkey_client(0)
        .decrypt(&config, b"opaque-cipher")
        .await
        .unwrap();
    assert_eq!(plain, b"dek");
}

#[tokio::test]
async fn test_missing_cipher_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(encrypt_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"kid": KEY_ID})))
        .mount(&server)
        .await;

    let err = smartkey_client(0)
        .encrypt(&provider_config(&server.uri()), b"dek")
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::RemoteResponseMalformed { .. }));
}

#[tokio::test]
async fn test_non_base64_plain_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(decrypt_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"plain": "%%%"})))
        .mount(&server)
        .await;

    let err = smartkey_client(0)
        .decrypt(&provider_config(&server.uri()), b"opaque")
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::RemoteResponseMalformed { .. }));
}

#[tokio::test]
async fn test_error_status_is_a_failed_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(encrypt_path()))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .expect(1)
        .mount(&server)
        .await;

    let err = smartkey_client(2)
        .encrypt(&provider_config(&server.uri()), b"dek")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProviderError::RemoteCallFailed {
            retryable: false,
            ..
        }
    ));
}

#[tokio::test]
async fn test_unreachable_remote_is_a_failed_call() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let err = smartkey_client(0)
        .encrypt(&provider_config(&endpoint), b"dek")
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::RemoteCallFailed { .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_transient_status_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(encrypt_path()))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(encrypt_path()))
        .respond_with(EchoEncrypt)
        .with_priority(2)
        .mount(&server)
        .await;

    let metrics = Arc::new(ProviderMetrics::new().unwrap());
    let client = smartkey_client(2).with_metrics(Arc::clone(&metrics));
    let cipher = client
        .encrypt(&provider_config(&server.uri()), b"dek")
        .await
        .unwrap();

    assert_eq!(cipher, b"ENC:ZGVr");
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
    assert_eq!(
        metrics
            .remote_calls_total
            .with_label_values(&["encrypt", "ok"])
            .get(),
        1
    );
}

#[tokio::test]
async fn test_retry_budget_is_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(encrypt_path()))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let err = smartkey_client(2)
        .encrypt(&provider_config(&server.uri()), b"dek")
        .await
        .unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_endpoint_with_base_path() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/smartkey/sys/v1/session/auth"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let config = provider_config(&format!("{}/smartkey/", server.uri()));
    smartkey_client(0).authenticate(&config).await.unwrap();
}
