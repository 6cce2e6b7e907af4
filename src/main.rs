//! SmartKey KMS Plugin - Main Entry Point

use clap::Parser;
use tracing::error;

use smartkey_kms::observability::init_tracing;
use smartkey_kms::{supervisor, Args, Settings};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("smartkey-kms-plugin: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = init_tracing(&settings.tracing_config()) {
        eprintln!("smartkey-kms-plugin: failed to initialize tracing: {e}");
        std::process::exit(1);
    }

    if let Err(e) = supervisor::run(args, settings).await {
        let phase = if e.is_startup_fatal() { "startup" } else { "serving" };
        error!(phase, error_code = e.code().as_str(), error = %e, "KMS provider failed");
        std::process::exit(1);
    }
}
