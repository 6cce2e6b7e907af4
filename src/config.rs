//! Provider Configuration Loading and Validation
//!
//! The configuration file is a flat JSON object of string values. It is checked
//! exactly once at startup: presence of every required key, local structure,
//! then two pre-flight calls against the remote KMS. Nothing is served until
//! all of it passes.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, instrument};
use url::Url;

use crate::smartkey::SmartKeyClient;

/// API key used as the Basic credential against the remote KMS.
pub const API_KEY_FIELD: &str = "smartkeyApiKey";
/// Identifier of the remote encryption key.
pub const KEY_ID_FIELD: &str = "encryptionKeyUuid";
/// Base64-encoded initialization vector.
pub const IV_FIELD: &str = "iv";
/// Unix socket path the provider listens on.
pub const SOCKET_FILE_FIELD: &str = "socketFile";
/// Base URL of the remote KMS.
pub const ENDPOINT_FIELD: &str = "smartkeyURL";

/// Required keys, in the order they are checked.
pub const REQUIRED_FIELDS: [&str; 5] = [
    API_KEY_FIELD,
    KEY_ID_FIELD,
    IV_FIELD,
    SOCKET_FILE_FIELD,
    ENDPOINT_FIELD,
];

/// AES block size in bytes.
pub const IV_LEN: usize = 16;

/// Configuration errors. All of them are fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File could not be read or is not a JSON object
    #[error("Failed to parse config file {path}: {reason}")]
    Parse {
        /// Path of the configuration file
        path: PathBuf,
        /// Underlying reason
        reason: String,
    },

    /// Required key absent
    #[error("Missing required configuration field: {0}")]
    FieldMissing(&'static str),

    /// Key present but not acceptable
    #[error("Invalid configuration field {field}: {reason}")]
    FieldInvalid {
        /// Offending key
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

impl ConfigError {
    /// Creates a FieldInvalid error.
    #[must_use]
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::FieldInvalid {
            field,
            reason: reason.into(),
        }
    }

    /// Returns the configuration key this error refers to, if any.
    #[must_use]
    pub const fn field(&self) -> Option<&'static str> {
        match self {
            Self::Parse { .. } => None,
            Self::FieldMissing(field) | Self::FieldInvalid { field, .. } => Some(field),
        }
    }
}

/// Validated provider configuration.
///
/// Immutable after construction and shared read-only by every request handler.
/// The API key is redacted from `Debug` output.
#[derive(Debug)]
pub struct ProviderConfig {
    api_key: SecretString,
    key_id: String,
    iv: [u8; IV_LEN],
    socket_path: PathBuf,
    remote_endpoint: Url,
}

impl ProviderConfig {
    /// Builds a configuration from its parts, applying the local structural checks.
    ///
    /// # Errors
    ///
    /// Returns `FieldInvalid` for an empty value, an IV that does not decode to
    /// 16 bytes, or an endpoint that is not an absolute http(s) URL.
    pub fn from_parts(
        api_key: &str,
        key_id: &str,
        iv: &str,
        socket_path: &str,
        remote_endpoint: &str,
    ) -> Result<Self, ConfigError> {
        for (field, value) in [
            (API_KEY_FIELD, api_key),
            (KEY_ID_FIELD, key_id),
            (IV_FIELD, iv),
            (SOCKET_FILE_FIELD, socket_path),
            (ENDPOINT_FIELD, remote_endpoint),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::invalid(field, "value must not be empty"));
            }
        }

        let iv = decode_iv(iv)?;
        let remote_endpoint = parse_endpoint(remote_endpoint)?;

        Ok(Self {
            api_key: SecretString::from(api_key.to_string()),
            key_id: key_id.to_string(),
            iv,
            socket_path: PathBuf::from(socket_path),
            remote_endpoint,
        })
    }

    /// Parses the JSON document and applies the local structural checks.
    ///
    /// # Errors
    ///
    /// `Parse` if the text is not a JSON object, `FieldMissing` naming the first
    /// absent key in [`REQUIRED_FIELDS`] order, `FieldInvalid` otherwise.
    pub fn from_json(path: &Path, text: &str) -> Result<Self, ConfigError> {
        let map: Map<String, Value> =
            serde_json::from_str(text).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        for field in REQUIRED_FIELDS {
            if map.get(field).map_or(true, Value::is_null) {
                return Err(ConfigError::FieldMissing(field));
            }
        }

        let value = |field: &'static str| -> Result<&str, ConfigError> {
            map.get(field)
                .and_then(Value::as_str)
                .ok_or_else(|| ConfigError::invalid(field, "value must be a string"))
        };

        Self::from_parts(
            value(API_KEY_FIELD)?,
            value(KEY_ID_FIELD)?,
            value(IV_FIELD)?,
            value(SOCKET_FILE_FIELD)?,
            value(ENDPOINT_FIELD)?,
        )
    }

    /// Reads and structurally checks the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// See [`ProviderConfig::from_json`]; an unreadable file is a `Parse` error.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_json(path, &text)
    }

    /// API key, exposed for the Authorization header only.
    #[must_use]
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    /// Remote key identifier.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Initialization vector in the base64 form the remote KMS expects.
    #[must_use]
    pub fn iv_base64(&self) -> String {
        STANDARD.encode(self.iv)
    }

    /// Socket path named in the configuration file.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Base URL of the remote KMS.
    #[must_use]
    pub const fn remote_endpoint(&self) -> &Url {
        &self.remote_endpoint
    }

    /// Builds a remote URL by appending percent-encoded path segments.
    #[must_use]
    pub fn endpoint_url(&self, segments: &[&str]) -> Url {
        let mut url = self.remote_endpoint.clone();
        // parse_endpoint rejects cannot-be-a-base URLs, so this always succeeds
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

/// Decodes the base64 IV and checks it is exactly one AES block.
fn decode_iv(iv: &str) -> Result<[u8; IV_LEN], ConfigError> {
    let bytes = STANDARD
        .decode(iv)
        .map_err(|e| ConfigError::invalid(IV_FIELD, format!("not valid base64: {e}")))?;

    <[u8; IV_LEN]>::try_from(bytes.as_slice()).map_err(|_| {
        ConfigError::invalid(
            IV_FIELD,
            format!("must decode to {IV_LEN} bytes, got {}", bytes.len()),
        )
    })
}

/// Parses the remote endpoint as an absolute http(s) base URL.
fn parse_endpoint(endpoint: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(endpoint)
        .map_err(|e| ConfigError::invalid(ENDPOINT_FIELD, e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::invalid(
            ENDPOINT_FIELD,
            format!("unsupported scheme {}", url.scheme()),
        ));
    }
    if url.cannot_be_a_base() {
        return Err(ConfigError::invalid(ENDPOINT_FIELD, "URL cannot be a base"));
    }
    Ok(url)
}

/// Startup gate: loads the configuration and runs the remote pre-flight checks.
pub struct ConfigValidator<'a> {
    client: &'a SmartKeyClient,
}

impl<'a> ConfigValidator<'a> {
    /// Creates a validator that probes the remote KMS through `client`.
    #[must_use]
    pub const fn new(client: &'a SmartKeyClient) -> Self {
        Self { client }
    }

    /// Loads, checks and pre-flights the configuration file.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`]; the caller must not start serving.
    #[instrument(skip(self))]
    pub async fn load(&self, path: &Path) -> Result<Arc<ProviderConfig>, ConfigError> {
        let config = ProviderConfig::from_file(path)?;
        self.validate_remote(&config).await?;

        info!(
            key_id = %config.key_id(),
            endpoint = %config.remote_endpoint(),
            "Provider configuration validated"
        );
        Ok(Arc::new(config))
    }

    /// Runs the authentication probe, then the key-metadata probe.
    ///
    /// # Errors
    ///
    /// `FieldInvalid(smartkeyApiKey)` if authentication is refused or fails,
    /// `FieldInvalid(encryptionKeyUuid)` if the key cannot be read or is not AES-256.
    pub async fn validate_remote(&self, config: &ProviderConfig) -> Result<(), ConfigError> {
        self.client
            .authenticate(config)
            .await
            .map_err(|e| ConfigError::invalid(API_KEY_FIELD, e.to_string()))?;

        let metadata = self
            .client
            .key_metadata(config)
            .await
            .map_err(|e| ConfigError::invalid(KEY_ID_FIELD, e.to_string()))?;

        if !metadata.is_aes_256() {
            return Err(ConfigError::invalid(
                KEY_ID_FIELD,
                format!(
                    "expected AES/256 key, found {}/{}",
                    metadata.obj_type,
                    metadata.key_size.unwrap_or_default()
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const VALID_IV: &str = "rFvgbU6EygpLUObqFZxITg==";

    fn full_document() -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(API_KEY_FIELD.into(), "QQ==".into());
        map.insert(KEY_ID_FIELD.into(), "u1".into());
        map.insert(IV_FIELD.into(), VALID_IV.into());
        map.insert(SOCKET_FILE_FIELD.into(), "/tmp/x.sock".into());
        map.insert(ENDPOINT_FIELD.into(), "https://mock".into());
        map
    }

    fn parse(map: &Map<String, Value>) -> Result<ProviderConfig, ConfigError> {
        let text = serde_json::to_string(map).unwrap();
        ProviderConfig::from_json(Path::new("test.json"), &text)
    }

    #[test]
    fn test_full_document_parses() {
        let config = parse(&full_document()).unwrap();
        assert_eq!(config.key_id(), "u1");
        assert_eq!(config.api_key(), "QQ==");
        assert_eq!(config.iv_base64(), VALID_IV);
        assert_eq!(config.socket_path(), Path::new("/tmp/x.sock"));
    }

    #[test]
    fn test_each_missing_field_is_named() {
        for field in REQUIRED_FIELDS {
            let mut map = full_document();
            map.remove(field);
            let err = parse(&map).unwrap_err();
            assert!(
                matches!(err, ConfigError::FieldMissing(f) if f == field),
                "expected missing {field}, got {err}"
            );
        }
    }

    #[test]
    fn test_first_missing_field_wins() {
        let mut map = full_document();
        map.remove(SOCKET_FILE_FIELD);
        map.remove(KEY_ID_FIELD);
        let err = parse(&map).unwrap_err();
        assert_eq!(err.field(), Some(KEY_ID_FIELD));
    }

    #[test]
    fn test_null_counts_as_missing() {
        let mut map = full_document();
        map.insert(IV_FIELD.into(), Value::Null);
        assert!(matches!(parse(&map), Err(ConfigError::FieldMissing(IV_FIELD))));
    }

    #[test]
    fn test_non_string_value_is_invalid() {
        let mut map = full_document();
        map.insert(KEY_ID_FIELD.into(), 42.into());
        let err = parse(&map).unwrap_err();
        assert!(matches!(err, ConfigError::FieldInvalid { field: KEY_ID_FIELD, .. }));
    }

    #[test]
    fn test_empty_value_is_invalid() {
        let mut map = full_document();
        map.insert(API_KEY_FIELD.into(), "".into());
        assert_eq!(parse(&map).unwrap_err().field(), Some(API_KEY_FIELD));
    }

    #[test]
    fn test_not_json_is_parse_error() {
        let err = ProviderConfig::from_json(Path::new("x"), "not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_json_array_is_parse_error() {
        let err = ProviderConfig::from_json(Path::new("x"), "[1, 2]").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_unreadable_file_is_parse_error() {
        let err = ProviderConfig::from_file(Path::new("/nonexistent/plugin.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_endpoint_without_scheme_is_invalid() {
        let mut map = full_document();
        map.insert(ENDPOINT_FIELD.into(), "www.smartkey.io".into());
        assert_eq!(parse(&map).unwrap_err().field(), Some(ENDPOINT_FIELD));
    }

    #[test]
    fn test_iv_is_checked_before_endpoint() {
        let mut map = full_document();
        map.insert(IV_FIELD.into(), "iv-1".into());
        map.insert(ENDPOINT_FIELD.into(), "mailto:nobody".into());
        assert_eq!(parse(&map).unwrap_err().field(), Some(IV_FIELD));
    }

    #[test]
    fn test_endpoint_url_encodes_segments() {
        let config = ProviderConfig::from_parts(
            "key",
            "a/b?c",
            VALID_IV,
            "/tmp/x.sock",
            "https://kms.example.com/api/",
        )
        .unwrap();
        let url = config.endpoint_url(&["crypto", "v1", "keys", config.key_id(), "encrypt"]);
        assert_eq!(
            url.as_str(),
            "https://kms.example.com/api/crypto/v1/keys/a%2Fb%3Fc/encrypt"
        );
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config =
            ProviderConfig::from_parts("super-secret", "u1", VALID_IV, "/tmp/x", "https://mock")
                .unwrap();
        assert!(!format!("{config:?}").contains("super-secret"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_iv_of_wrong_length_is_rejected(
            bytes in proptest::collection::vec(any::<u8>(), 0..64)
                .prop_filter("not a block", |b| b.len() != IV_LEN)
        ) {
            let err = decode_iv(&STANDARD.encode(&bytes)).unwrap_err();
            prop_assert_eq!(err.field(), Some(IV_FIELD));
        }

        #[test]
        fn prop_iv_of_block_length_round_trips(bytes in proptest::array::uniform16(any::<u8>())) {
            let decoded = decode_iv(&STANDARD.encode(bytes)).unwrap();
            prop_assert_eq!(decoded, bytes);
        }

        #[test]
        fn prop_non_base64_iv_is_rejected(iv in "[^A-Za-z0-9+/=]{1,24}") {
            prop_assert_eq!(decode_iv(&iv).unwrap_err().field(), Some(IV_FIELD));
        }
    }
}
