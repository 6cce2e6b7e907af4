//! Startup parameters.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// Default address of the plaintext diagnostic endpoint.
pub const DEFAULT_DEBUG_LISTEN_ADDR: &str = "127.0.0.1:7901";

/// KMS v1beta1 provider plugin backed by SmartKey
#[derive(Parser, Debug, Clone)]
#[command(name = "smartkey-kms-plugin", version)]
#[command(about = "Envelope-encryption provider for the Kubernetes API server, backed by SmartKey")]
pub struct Args {
    /// Unix socket file the gRPC server listens on
    #[arg(long = "socketFile", value_name = "PATH")]
    pub socket_file: PathBuf,

    /// SmartKey configuration file (JSON)
    #[arg(long = "smartkeyConfig", value_name = "PATH")]
    pub smartkey_config: PathBuf,

    /// Plaintext HTTP listen address for diagnostics
    #[arg(long = "debug-listen-addr", default_value = DEFAULT_DEBUG_LISTEN_ADDR)]
    pub debug_listen_addr: SocketAddr,
}
