//! SmartKey REST request and response bodies.

use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;

/// Cipher algorithm requested from the remote KMS.
pub const ALGORITHM: &str = "AES";
/// Block cipher mode requested from the remote KMS.
pub const MODE: &str = "CBC";
/// Key size, in bits, the configured key must have.
pub const KEY_SIZE_BITS: u32 = 256;

/// Body of `POST /crypto/v1/keys/{id}/encrypt`.
#[derive(Debug, Serialize)]
pub struct EncryptBody {
    /// Cipher algorithm, always [`ALGORITHM`]
    pub alg: &'static str,
    /// Block cipher mode, always [`MODE`]
    pub mode: &'static str,
    /// Base64 initialization vector from the configuration
    pub iv: String,
    /// Base64 plaintext
    pub plain: String,
}

impl EncryptBody {
    /// Builds the body for base64-encoded plaintext.
    #[must_use]
    pub fn new(config: &ProviderConfig, plain: String) -> Self {
        Self {
            alg: ALGORITHM,
            mode: MODE,
            iv: config.iv_base64(),
            plain,
        }
    }
}

/// Body of `POST /crypto/v1/keys/{id}/decrypt`.
#[derive(Debug, Serialize)]
pub struct DecryptBody<'a> {
    /// Cipher algorithm, always [`ALGORITHM`]
    pub alg: &'static str,
    /// Block cipher mode, always [`MODE`]
    pub mode: &'static str,
    /// Base64 initialization vector, the same one used to encrypt
    pub iv: String,
    /// Ciphertext exactly as returned by encrypt
    pub cipher: &'a str,
}

impl<'a> DecryptBody<'a> {
    /// Builds the body for ciphertext in the remote service's serialized form.
    #[must_use]
    pub fn new(config: &ProviderConfig, cipher: &'a str) -> Self {
        Self {
            alg: ALGORITHM,
            mode: MODE,
            iv: config.iv_base64(),
            cipher,
        }
    }
}

/// Encrypt response.
#[derive(Debug, Deserialize)]
pub struct EncryptResponse {
    /// Identifier of the key that encrypted
    pub kid: Option<String>,
    /// Ciphertext in the remote service's serialized form
    pub cipher: Option<String>,
    /// Initialization vector echoed back
    pub iv: Option<String>,
}

/// Decrypt response.
#[derive(Debug, Deserialize)]
pub struct DecryptResponse {
    /// Identifier of the key that decrypted
    pub kid: Option<String>,
    /// Base64 plaintext
    pub plain: Option<String>,
    /// Initialization vector echoed back
    pub iv: Option<String>,
}

/// Security object metadata from `GET /crypto/v1/keys/{id}`.
#[derive(Debug, Deserialize)]
pub struct KeyObject {
    /// Size in bits; absent for elliptic curve objects
    pub key_size: Option<u32>,
    /// Object type, e.g. `AES` or `RSA`
    pub obj_type: String,
}

impl KeyObject {
    /// Whether the key is the AES-256 key the provider requires.
    #[must_use]
    pub fn is_aes_256(&self) -> bool {
        self.obj_type == ALGORITHM && self.key_size == Some(KEY_SIZE_BITS)
    }
}
