//! Error handling for the provider.
//!
//! Startup-phase errors abort the process before the socket opens.
//! Request-phase errors are scoped to a single RPC and surface to the caller
//! as a gRPC status carrying a correlation ID.

use std::path::PathBuf;

use thiserror::Error;
use tonic::{Code, Status};
use uuid::Uuid;

use crate::config::ConfigError;

/// Patterns that must never appear in a reason sent to callers or logs
const SENSITIVE_PATTERNS: &[&str] = &[
    "authorization",
    "basic ",
    "apikey",
    "api_key",
    "secret",
    "password",
    "credential",
];

/// Provider error taxonomy.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Configuration file rejected
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Process settings from the environment rejected
    #[error("Invalid setting {name}: {reason}")]
    SettingsInvalid {
        /// Environment variable name
        name: String,
        /// Why it was rejected
        reason: String,
    },

    /// The remote KMS could not be reached or refused the call
    #[error("Remote call {operation} failed: {reason}")]
    RemoteCallFailed {
        /// Remote operation name
        operation: &'static str,
        /// Sanitized reason
        reason: String,
        /// Whether another attempt may succeed
        retryable: bool,
    },

    /// The remote KMS answered with a body lacking the expected content
    #[error("Remote response for {operation} malformed: {reason}")]
    RemoteResponseMalformed {
        /// Remote operation name
        operation: &'static str,
        /// Sanitized reason
        reason: String,
    },

    /// Ciphertext handed in by the caller cannot have come from this provider
    #[error("Invalid ciphertext: {reason}")]
    InvalidCiphertext {
        /// Why it was rejected
        reason: String,
    },

    /// The Unix socket could not be prepared or bound
    #[error("Failed to bind socket {path}: {reason}")]
    SocketBind {
        /// Socket path
        path: PathBuf,
        /// Why binding failed
        reason: String,
    },

    /// The diagnostic endpoint could not be bound
    #[error("Failed to bind diagnostic endpoint {addr}: {reason}")]
    DiagnosticsBind {
        /// Listen address
        addr: String,
        /// Why binding failed
        reason: String,
    },

    /// A termination signal handler could not be installed
    #[error("Failed to install signal handler: {0}")]
    Signal(String),

    /// Anything else (details never sent to callers)
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Stable error codes for logs and RPC messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ConfigParse,
    ConfigFieldMissing,
    ConfigFieldInvalid,
    SettingsInvalid,
    RemoteCallFailed,
    RemoteResponseMalformed,
    InvalidCiphertext,
    SocketBind,
    DiagnosticsBind,
    Signal,
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigParse => "CONFIG_PARSE_ERROR",
            Self::ConfigFieldMissing => "CONFIG_FIELD_MISSING",
            Self::ConfigFieldInvalid => "CONFIG_FIELD_INVALID",
            Self::SettingsInvalid => "SETTINGS_INVALID",
            Self::RemoteCallFailed => "REMOTE_CALL_FAILED",
            Self::RemoteResponseMalformed => "REMOTE_RESPONSE_MALFORMED",
            Self::InvalidCiphertext => "INVALID_CIPHERTEXT",
            Self::SocketBind => "SOCKET_BIND_ERROR",
            Self::DiagnosticsBind => "DIAGNOSTICS_BIND_ERROR",
            Self::Signal => "SIGNAL_ERROR",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    /// Get the gRPC status code for this error
    pub const fn grpc_code(&self) -> Code {
        match self {
            Self::RemoteCallFailed => Code::Unavailable,
            Self::InvalidCiphertext => Code::InvalidArgument,
            _ => Code::Internal,
        }
    }
}

impl ProviderError {
    /// Creates a RemoteCallFailed error with a sanitized reason.
    #[must_use]
    pub fn remote_call(operation: &'static str, reason: impl Into<String>, retryable: bool) -> Self {
        Self::RemoteCallFailed {
            operation,
            reason: sanitize_message(&reason.into()),
            retryable,
        }
    }

    /// Creates a RemoteResponseMalformed error with a sanitized reason.
    #[must_use]
    pub fn malformed(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::RemoteResponseMalformed {
            operation,
            reason: sanitize_message(&reason.into()),
        }
    }

    /// Get the error code for this error
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Config(ConfigError::Parse { .. }) => ErrorCode::ConfigParse,
            Self::Config(ConfigError::FieldMissing(_)) => ErrorCode::ConfigFieldMissing,
            Self::Config(ConfigError::FieldInvalid { .. }) => ErrorCode::ConfigFieldInvalid,
            Self::SettingsInvalid { .. } => ErrorCode::SettingsInvalid,
            Self::RemoteCallFailed { .. } => ErrorCode::RemoteCallFailed,
            Self::RemoteResponseMalformed { .. } => ErrorCode::RemoteResponseMalformed,
            Self::InvalidCiphertext { .. } => ErrorCode::InvalidCiphertext,
            Self::SocketBind { .. } => ErrorCode::SocketBind,
            Self::DiagnosticsBind { .. } => ErrorCode::DiagnosticsBind,
            Self::Signal(_) => ErrorCode::Signal,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Whether this error belongs to the startup phase and must stop the process
    pub const fn is_startup_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::SettingsInvalid { .. }
                | Self::SocketBind { .. }
                | Self::DiagnosticsBind { .. }
                | Self::Signal(_)
        )
    }

    /// Check if this error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RemoteCallFailed { retryable: true, .. })
    }

    /// Convert to gRPC Status with correlation ID
    pub fn to_status(&self, correlation_id: Uuid) -> Status {
        let message = match self {
            Self::RemoteCallFailed { operation, .. } => {
                format!("Remote KMS {operation} call failed")
            }
            Self::RemoteResponseMalformed { operation, .. } => {
                format!("Remote KMS {operation} response malformed")
            }
            Self::InvalidCiphertext { reason } => format!("Invalid ciphertext: {reason}"),
            // Never expose internal error details
            _ => "Internal error".to_string(),
        };
        Status::new(
            self.code().grpc_code(),
            format!("{message} [correlation_id: {correlation_id}]"),
        )
    }
}

/// Sanitize a message by removing sensitive information
fn sanitize_message(message: &str) -> String {
    if contains_sensitive_info(message) {
        return "details redacted".to_string();
    }
    message.to_string()
}

/// Check if a string contains sensitive information
fn contains_sensitive_info(text: &str) -> bool {
    let lower = text.to_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}
