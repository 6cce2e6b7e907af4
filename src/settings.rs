//! Process settings from environment variables.
//!
//! These tune the plugin's own behaviour (timeouts, retry budget, logging).
//! The provider configuration proper lives in the JSON file, see `config`.

use std::env;
use std::time::Duration;

use crate::error::ProviderError;
use crate::http::HttpConfig;
use crate::observability::TracingConfig;
use crate::retry::RetryPolicy;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line
    Json,
    /// Human-readable lines
    Text,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" | "plain" => Ok(Self::Text),
            other => Err(format!("unknown log format {other}")),
        }
    }
}

/// Process settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Timeout for a single remote KMS request
    pub request_timeout: Duration,
    /// Connect timeout for the remote KMS
    pub connect_timeout: Duration,
    /// Extra attempts for transient remote failures
    pub max_retries: u32,
    /// First backoff delay
    pub retry_initial_delay: Duration,
    /// Log filter used when RUST_LOG is unset
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,
    /// How long to wait for the diagnostic server after the socket stopped
    pub shutdown_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            max_retries: 2,
            retry_initial_delay: Duration::from_millis(100),
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl Settings {
    /// Loads settings from environment variables (and `.env` if present).
    ///
    /// # Errors
    ///
    /// Returns `SettingsInvalid` if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, ProviderError> {
        dotenvy::dotenv().ok();

        let settings = Self {
            request_timeout: Duration::from_secs(parse_env("SMARTKEY_REQUEST_TIMEOUT", 30)?),
            connect_timeout: Duration::from_secs(parse_env("SMARTKEY_CONNECT_TIMEOUT", 10)?),
            max_retries: parse_env("SMARTKEY_MAX_RETRIES", 2)?,
            retry_initial_delay: Duration::from_millis(parse_env(
                "SMARTKEY_RETRY_INITIAL_DELAY_MS",
                100,
            )?),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format: parse_env("LOG_FORMAT", LogFormat::Json)?,
            shutdown_timeout: Duration::from_secs(parse_env("SHUTDOWN_TIMEOUT", 30)?),
        };

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ProviderError> {
        if self.request_timeout.is_zero() {
            return Err(invalid("SMARTKEY_REQUEST_TIMEOUT", "timeout must be greater than 0"));
        }
        if self.connect_timeout.is_zero() {
            return Err(invalid("SMARTKEY_CONNECT_TIMEOUT", "timeout must be greater than 0"));
        }
        Ok(())
    }

    /// HTTP client configuration for the remote KMS.
    #[must_use]
    pub fn http_config(&self) -> HttpConfig {
        HttpConfig::default()
            .with_timeout(self.request_timeout)
            .with_connect_timeout(self.connect_timeout)
    }

    /// Retry policy for remote KMS calls.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_initial_delay)
    }

    /// Tracing subscriber configuration.
    #[must_use]
    pub fn tracing_config(&self) -> TracingConfig {
        let config = TracingConfig::default()
            .with_service_name("smartkey-kms-plugin")
            .with_log_level(&self.log_level);
        match self.log_format {
            LogFormat::Json => config.with_json_output(),
            LogFormat::Text => config,
        }
    }
}

fn invalid(name: &str, reason: impl Into<String>) -> ProviderError {
    ProviderError::SettingsInvalid {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Parse an environment variable with a default value.
fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ProviderError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val.parse().map_err(|e: T::Err| invalid(name, e.to_string())),
        Err(_) => Ok(default),
    }
}
