//! SmartKey remote KMS integration.
//!
//! The plugin never performs AES itself: encrypt and decrypt are relayed to
//! the remote key-management service, which holds the key.

pub mod client;
pub mod models;

use async_trait::async_trait;

use crate::config::ProviderConfig;
use crate::error::ProviderError;

pub use client::SmartKeyClient;
pub use models::{DecryptBody, DecryptResponse, EncryptBody, EncryptResponse, KeyObject};

/// Backend that performs the cryptographic operation on behalf of the provider.
#[async_trait]
pub trait RemoteCrypto: Send + Sync + 'static {
    /// Encrypts `plaintext` with the configured key, returning the remote
    /// service's serialized ciphertext.
    async fn encrypt(
        &self,
        config: &ProviderConfig,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, ProviderError>;

    /// Decrypts ciphertext previously produced by [`RemoteCrypto::encrypt`].
    async fn decrypt(
        &self,
        config: &ProviderConfig,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, ProviderError>;
}
