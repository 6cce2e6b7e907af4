//! SmartKey KMS Plugin - Kubernetes envelope-encryption provider.
//!
//! Serves the KMS v1beta1 `KeyManagementService` on a Unix domain socket and
//! relays encrypt and decrypt calls to a SmartKey key-management service,
//! which holds the AES-256 key encryption key.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod error;
pub mod grpc;
pub mod http;
pub mod observability;
pub mod proto;
pub mod retry;
pub mod settings;
pub mod shutdown;
pub mod smartkey;
pub mod socket;
pub mod supervisor;

pub use cli::Args;
pub use config::{ConfigError, ConfigValidator, ProviderConfig};
pub use error::{ErrorCode, ProviderError};
pub use grpc::{KeyManagementServiceImpl, VersionInfo};
pub use settings::Settings;
pub use smartkey::{RemoteCrypto, SmartKeyClient};
pub use socket::{ProviderSocket, SocketState};
