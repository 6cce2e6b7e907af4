//! KMS v1beta1 wire messages.
//!
//! Field numbers follow the Kubernetes `v1beta1` KMS service definition so the
//! API server's client can talk to this plugin unchanged.

/// Version negotiation request.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VersionRequest {
    /// Version of the KMS API the caller speaks.
    #[prost(string, tag = "1")]
    pub version: String,
}

/// Version negotiation response.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VersionResponse {
    /// KMS API version implemented by the plugin.
    #[prost(string, tag = "1")]
    pub version: String,
    /// Name of the remote KMS runtime.
    #[prost(string, tag = "2")]
    pub runtime_name: String,
    /// Version of the remote KMS runtime integration.
    #[prost(string, tag = "3")]
    pub runtime_version: String,
}

/// Request to decrypt a data key.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DecryptRequest {
    /// Version of the KMS API the caller speaks.
    #[prost(string, tag = "1")]
    pub version: String,
    /// Ciphertext previously returned by `Encrypt`.
    #[prost(bytes = "vec", tag = "2")]
    pub cipher: Vec<u8>,
}

/// Decrypted data key.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DecryptResponse {
    /// Plaintext bytes.
    #[prost(bytes = "vec", tag = "1")]
    pub plain: Vec<u8>,
}

/// Request to encrypt a data key.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EncryptRequest {
    /// Version of the KMS API the caller speaks.
    #[prost(string, tag = "1")]
    pub version: String,
    /// Plaintext bytes.
    #[prost(bytes = "vec", tag = "2")]
    pub plain: Vec<u8>,
}

/// Encrypted data key.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EncryptResponse {
    /// Ciphertext in the remote service's serialized form.
    #[prost(bytes = "vec", tag = "1")]
    pub cipher: Vec<u8>,
}

// Generated server and client stubs (see build.rs).
include!(concat!(env!("OUT_DIR"), "/v1beta1.KeyManagementService.rs"));
