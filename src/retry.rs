//! Retry of remote KMS calls.
//!
//! Encrypt and decrypt are retried on transient failure with jittered
//! exponential backoff. The two startup pre-flight checks are issued exactly
//! once: a refused or unreachable KMS at startup fails validation at once.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::ProviderError;

/// Upper bound of a single backoff delay, before jitter.
pub const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Largest fraction added on top of a backoff delay.
const JITTER_FRACTION: f64 = 0.25;

/// Calls the plugin makes against the remote KMS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOperation {
    /// `POST /sys/v1/session/auth`
    Authenticate,
    /// `GET /crypto/v1/keys/{id}`
    KeyMetadata,
    /// `POST /crypto/v1/keys/{id}/encrypt`
    Encrypt,
    /// `POST /crypto/v1/keys/{id}/decrypt`
    Decrypt,
}

impl RemoteOperation {
    /// Label used in errors, logs and metrics.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Authenticate => "auth",
            Self::KeyMetadata => "key_metadata",
            Self::Encrypt => "encrypt",
            Self::Decrypt => "decrypt",
        }
    }

    /// Startup validation calls, never repeated.
    pub const fn is_preflight(self) -> bool {
        matches!(self, Self::Authenticate | Self::KeyMetadata)
    }
}

/// Retry budget and backoff for remote KMS calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_delay: Duration,
}

impl RetryPolicy {
    /// Allows `max_retries` extra attempts, the first after `initial_delay`.
    #[must_use]
    pub const fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
        }
    }

    /// Every call is attempted once.
    #[must_use]
    pub const fn disabled() -> Self {
        Self::new(0, Duration::from_millis(100))
    }

    /// Delay before retry number `attempt + 1`: doubling from the initial
    /// delay, capped at [`MAX_BACKOFF`], plus up to a quarter of jitter.
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        let delay = self.initial_delay.saturating_mul(factor).min(MAX_BACKOFF);
        delay.mul_f64(1.0 + rand::random::<f64>() * JITTER_FRACTION)
    }

    fn should_retry(&self, operation: RemoteOperation, error: &ProviderError, attempt: u32) -> bool {
        !operation.is_preflight() && attempt < self.max_retries && error.is_retryable()
    }

    /// Runs `call` until it succeeds, fails permanently or the budget is spent.
    ///
    /// # Errors
    ///
    /// The error of the last attempt.
    pub async fn execute<F, Fut, T>(
        &self,
        operation: RemoteOperation,
        mut call: F,
    ) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0;
        loop {
            let error = match call().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            if !self.should_retry(operation, &error, attempt) {
                return Err(error);
            }

            let delay = self.backoff(attempt);
            attempt += 1;
            warn!(
                operation = operation.as_str(),
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "Transient remote KMS failure, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_millis(100))
    }
}
